//! Copy propagation.
//!
//! Folds move chains into their consumers: algebraic modifiers
//! (`absneg.f`/`absneg.s` and friends) are combined into the consuming
//! source where the ISA permits, constant-file reads are forwarded past
//! same-type movs, and inline immediates are either encoded directly or
//! demoted to a constant-pool slot. Eliminated movs are left dead for DCE.
//!
//! No fold is ever applied speculatively: every rewrite is first checked
//! against the encoding constraints, and an inexpressible fold simply
//! reports no progress.

use crate::context::Compiler;
use crate::ir::{Block, Inst, NumType, OpPayload, RegFlags, Shader};
use crate::isa::valid_flags;
use crate::timing;
use smallvec::SmallVec;

/// Run copy propagation over the whole shader. Returns `true` if anything
/// changed.
pub fn copy_propagate(sh: &mut Shader, compiler: &Compiler) -> bool {
    let _tt = timing::copy_prop();
    let mut progress = false;
    let blocks: Vec<Block> = sh.layout.blocks().collect();
    for block in blocks {
        let insts: Vec<Inst> = sh.layout.block_insts(block).collect();
        for inst in insts {
            progress |= instr_cp(sh, compiler, inst);
        }
        progress |= eliminate_output_movs(sh, block);
    }
    progress
}

/// Fold the sources of one instruction to a local fixpoint.
fn instr_cp(sh: &mut Shader, compiler: &Compiler, inst: Inst) -> bool {
    let mut progress_any = false;
    loop {
        let mut progress = false;
        let nsrcs = sh.insts[inst].srcs.len();
        for n in 0..nsrcs {
            progress |= reg_cp(sh, compiler, inst, n);
        }
        if !progress {
            break;
        }
        progress_any = true;
    }
    progress_any
}

/// Is `inst` a mov that copy propagation may eliminate?
///
/// `allow_modifier_mov` admits `absneg.f`/`absneg.s`, whose whole purpose
/// is a foldable modifier.
pub fn is_eligible_mov(sh: &Shader, inst: Inst, allow_modifier_mov: bool) -> bool {
    use crate::ir::{InstrFlags, Opcode};
    let data = &sh.insts[inst];
    match data.opcode {
        Opcode::Mov => {
            if !data.is_same_type_mov() {
                return false;
            }
        }
        Opcode::AbsnegF | Opcode::AbsnegS => {
            if !allow_modifier_mov {
                return false;
            }
        }
        _ => return false,
    }
    if data.flags.contains(InstrFlags::SAT) {
        return false;
    }
    if data.dsts.len() != 1 || data.srcs.len() != 1 {
        return false;
    }
    let dst = sh.regs[data.dsts[0]].flags;
    let src = sh.regs[data.srcs[0]].flags;
    if !src.contains(RegFlags::SSA)
        || src.intersects(RegFlags::CONST | RegFlags::IMMED | RegFlags::RELATIV | RegFlags::ARRAY)
    {
        return false;
    }
    if dst.intersects(
        RegFlags::PREDICATE | RegFlags::ADDR | RegFlags::RELATIV | RegFlags::ARRAY,
    ) {
        return false;
    }
    // Widening a half shared value through a mov is kept as an explicit
    // instruction on targets with the shared-register quirk.
    if sh.gpu.mov_half_shared_quirk
        && src.contains(RegFlags::HALF | RegFlags::SHARED)
        && !dst.contains(RegFlags::HALF)
    {
        return false;
    }
    true
}

/// Combine a producer's source flags into a consumer source.
///
/// Negations cancel in pairs, an outer absolute value absorbs an inner
/// negation, absolute values are idempotent, and the value-source bits
/// (immediate/constant/relative/array) and file bits travel with the
/// producer.
pub fn combine_flags(producer: RegFlags, consumer: RegFlags) -> RegFlags {
    let mut p = producer;
    if consumer.contains(RegFlags::FABS) {
        p.remove(RegFlags::FNEG);
    }
    if consumer.contains(RegFlags::SABS) {
        p.remove(RegFlags::SNEG);
    }
    let mut out = consumer;
    for neg in [RegFlags::FNEG, RegFlags::SNEG, RegFlags::BNOT] {
        if p.contains(neg) {
            out.toggle(neg);
        }
    }
    out.insert(p.intersection(RegFlags::FABS | RegFlags::SABS));
    out.insert(p.intersection(RegFlags::ROLE));
    out.remove(RegFlags::HALF | RegFlags::SHARED);
    out.insert(p.intersection(RegFlags::HALF | RegFlags::SHARED));
    out
}

/// One fold attempt for source `n` of `inst`.
fn reg_cp(sh: &mut Shader, compiler: &Compiler, inst: Inst, n: usize) -> bool {
    let src = sh.insts[inst].srcs[n];
    if !sh.regs[src].flags.contains(RegFlags::SSA) {
        return false;
    }
    let Some(def) = sh.regs[src].def.expand() else {
        return false;
    };
    let Some(mov) = sh.regs[def].instr.expand() else {
        return false;
    };

    if is_eligible_mov(sh, mov, true) {
        return fold_ssa_mov(sh, inst, n, mov);
    }

    // Same-type movs from the constant file or an immediate are not
    // "eligible" (their source is not an SSA reference) but can still be
    // forwarded.
    if sh.insts[mov].is_same_type_mov()
        && sh.insts[mov].dsts.len() == 1
        && sh.insts[mov].srcs.len() == 1
        && !sh.insts[mov]
            .flags
            .contains(crate::ir::InstrFlags::SAT)
    {
        let mov_src = sh.insts[mov].srcs[0];
        let role = sh.regs[mov_src].flags;
        if role.intersects(RegFlags::CONST | RegFlags::RELATIV) {
            return fold_const_mov(sh, compiler, inst, n, mov);
        }
        if role.contains(RegFlags::IMMED) {
            return fold_immed_mov(sh, compiler, inst, n, mov);
        }
    }
    false
}

/// Fold an eligible mov of an SSA value: combine modifiers and retarget the
/// consumer source at the mov's own source.
fn fold_ssa_mov(sh: &mut Shader, inst: Inst, n: usize, mov: Inst) -> bool {
    let src = sh.insts[inst].srcs[n];
    let mov_src = sh.insts[mov].srcs[0];
    let mut new_flags = combine_flags(sh.regs[mov_src].flags, sh.regs[src].flags);

    // A compare result is already non-negative, so a signed abs on it is a
    // no-op and can be dropped to make the fold expressible.
    if new_flags.contains(RegFlags::SABS) {
        if let Some(ultimate) = sh.regs[mov_src].def.expand() {
            if sh.is_known_bool(ultimate) {
                new_flags.remove(RegFlags::SABS);
            }
        }
    }

    let mut pos = n;
    if !valid_flags(sh, inst, n, new_flags) {
        match swap_cat3_for(sh, inst, n, new_flags) {
            Some(new_pos) => pos = new_pos,
            None => return false,
        }
    }

    let new_def = sh.regs[mov_src].def;
    debug_assert!(new_def.is_some());
    let target = sh.insts[inst].srcs[pos];
    sh.regs[target].flags = new_flags;
    sh.regs[target].def = new_def;

    // The consumer now uses the producer's producer.
    let new_owner = sh.regs[new_def.unwrap()].instr.unwrap();
    sh.insts[new_owner].use_count += 1;
    sh.insts[mov].use_count = sh.insts[mov].use_count.saturating_sub(1);
    log::trace!("cp: folded mov {mov} into {inst} src{pos}");
    true
}

/// Fold a same-type mov whose source reads the constant file (possibly
/// relative).
fn fold_const_mov(
    sh: &mut Shader,
    compiler: &Compiler,
    inst: Inst,
    n: usize,
    mov: Inst,
) -> bool {
    let src = sh.insts[inst].srcs[n];
    let mov_src = sh.insts[mov].srcs[0];
    let msd = sh.regs[mov_src].clone();
    let new_flags = combine_flags(msd.flags, sh.regs[src].flags);

    if msd.flags.contains(RegFlags::RELATIV) {
        // Only one address register per instruction, and the values must
        // agree.
        let mov_addr = sh.insts[mov].address;
        let inst_addr = sh.insts[inst].address;
        if mov_addr.is_some() && inst_addr.is_some() && mov_addr != inst_addr {
            return false;
        }
        // Relative offset 0 in the second cat3 constant slot triggers a
        // documented encoding bug on quirked targets.
        if compiler.gpu.cat3_rel_offset_0_quirk
            && sh.insts[inst].opcode.category() == crate::ir::Category::Cat3
            && n == 2
            && msd.array_offset == 0
        {
            return false;
        }
    }

    // Width changes across the fold. The constant file is 32-bit storage:
    // widening a 16-bit read is not expressible, and narrowing is only
    // meaningful for float consumers reading a float constant.
    let mov_types = match sh.insts[mov].payload {
        OpPayload::Mov { src_type, .. } => src_type,
        _ => return false,
    };
    let const_half = msd.flags.contains(RegFlags::HALF);
    let use_half = sh.regs[src].flags.contains(RegFlags::HALF);
    if const_half && !use_half {
        return false;
    }
    if !const_half && use_half {
        if !sh.insts[inst].opcode.is_float() {
            return false;
        }
        if matches!(mov_types, NumType::U16 | NumType::S16) {
            return false;
        }
    }

    let mut pos = n;
    if !valid_flags(sh, inst, n, new_flags) {
        match swap_cat3_for(sh, inst, n, new_flags) {
            Some(new_pos) => pos = new_pos,
            None => return false,
        }
    }

    let target = sh.insts[inst].srcs[pos];
    {
        let rd = &mut sh.regs[target];
        rd.flags = new_flags;
        rd.flags.remove(RegFlags::SSA);
        rd.def = None.into();
        rd.num = msd.num;
        rd.array = msd.array;
        rd.array_offset = msd.array_offset;
        rd.array_base = msd.array_base;
    }
    if msd.flags.contains(RegFlags::RELATIV) && sh.insts[inst].address.is_none() {
        if let Some(addr) = sh.insts[mov].address.expand() {
            let owner = sh.regs[addr].instr.unwrap();
            sh.insts[inst].address = addr.into();
            sh.insts[owner].use_count += 1;
            if sh.regs[addr].num & 1 == 0 {
                sh.a0_users.push(inst);
            } else {
                sh.a1_users.push(inst);
            }
        }
    }
    sh.insts[mov].use_count = sh.insts[mov].use_count.saturating_sub(1);
    log::trace!("cp: folded const mov {mov} into {inst} src{pos}");
    true
}

/// Fold a same-type mov of an inline immediate: encode it inline when the
/// consumer can, otherwise demote it to a constant slot.
fn fold_immed_mov(
    sh: &mut Shader,
    compiler: &Compiler,
    inst: Inst,
    n: usize,
    mov: Inst,
) -> bool {
    let src = sh.insts[inst].srcs[n];
    let mov_src = sh.insts[mov].srcs[0];
    let msd = sh.regs[mov_src].clone();
    let mut new_flags = combine_flags(msd.flags, sh.regs[src].flags);

    // Pre-evaluate modifiers on the literal.
    let mut bits = msd.imm;
    let half = new_flags.contains(RegFlags::HALF);
    if new_flags.contains(RegFlags::SABS) {
        bits = (bits as i32).unsigned_abs();
    }
    if new_flags.contains(RegFlags::SNEG) {
        bits = (bits as i32).wrapping_neg() as u32;
    }
    if new_flags.contains(RegFlags::BNOT) {
        bits = !bits;
    }
    let sign_bit = if half { 0x8000 } else { 0x8000_0000 };
    if new_flags.contains(RegFlags::FABS) {
        bits &= !sign_bit;
    }
    if new_flags.contains(RegFlags::FNEG) {
        bits ^= sign_bit;
    }
    new_flags.remove(RegFlags::MODS);

    if valid_flags(sh, inst, n, new_flags) {
        let target = sh.insts[inst].srcs[n];
        let rd = &mut sh.regs[target];
        rd.flags = new_flags;
        rd.flags.remove(RegFlags::SSA);
        rd.def = None.into();
        rd.imm = bits;
        rd.num = crate::ir::INVALID_REG;
        sh.insts[mov].use_count = sh.insts[mov].use_count.saturating_sub(1);
        log::trace!("cp: inlined immediate from {mov} into {inst} src{n}");
        return true;
    }

    if !compiler.options.lower_imm_to_const {
        return false;
    }

    let mut const_flags = new_flags;
    const_flags.remove(RegFlags::IMMED);
    const_flags.insert(RegFlags::CONST);
    let mut pos = n;
    if !valid_flags(sh, inst, n, const_flags) {
        match swap_cat3_for(sh, inst, n, const_flags) {
            Some(new_pos) => pos = new_pos,
            None => return false,
        }
    }

    // Half float literals widen: the hardware's half constants are read
    // from 32-bit slots.
    let mut pool_bits = bits;
    if half && sh.insts[inst].opcode.is_float() {
        pool_bits = crate::ir::reg::half_to_f32(bits as u16).to_bits();
    }
    let idx = sh.consts.lookup_or_add_imm(pool_bits);

    let target = sh.insts[inst].srcs[pos];
    let rd = &mut sh.regs[target];
    rd.flags = const_flags;
    rd.flags.remove(RegFlags::SSA);
    rd.def = None.into();
    rd.num = idx;
    rd.imm = 0;
    sh.insts[mov].use_count = sh.insts[mov].use_count.saturating_sub(1);
    log::trace!("cp: demoted immediate from {mov} to c[{idx}] in {inst} src{pos}");
    true
}

/// Try to rewrite a cat3 `mad`/`sad` so a constant-like operand lands in a
/// position that can encode it. Returns the operand's new index.
///
/// `mad` is commutative in its first two sources; `sad` additionally in all
/// three. The `swapped` payload bit keeps the rewrite from ping-ponging.
fn swap_cat3_for(sh: &mut Shader, inst: Inst, n: usize, flags: RegFlags) -> Option<usize> {
    let opcode = sh.insts[inst].opcode;
    if !(opcode.is_mad() || opcode.is_sad()) || n != 1 {
        return None;
    }
    if !flags.intersects(
        RegFlags::CONST | RegFlags::RELATIV | RegFlags::SHARED | RegFlags::IMMED,
    ) {
        return None;
    }
    match sh.insts[inst].payload {
        OpPayload::Cat3 { swapped } if swapped => return None,
        OpPayload::Cat3 { .. } => {}
        _ => return None,
    }

    let mut candidates: SmallVec<[usize; 2]> = SmallVec::new();
    if opcode.is_sad() {
        candidates.push(2);
    }
    candidates.push(0);

    for &other in &candidates {
        sh.insts[inst].srcs.swap(n, other);
        let displaced = sh.insts[inst].srcs[n];
        let displaced_flags = sh.regs[displaced].flags;
        if valid_flags(sh, inst, other, flags) && valid_flags(sh, inst, n, displaced_flags) {
            sh.insts[inst].payload = OpPayload::Cat3 { swapped: true };
            log::trace!("cp: swapped {inst} srcs {n} and {other}");
            return Some(other);
        }
        sh.insts[inst].srcs.swap(n, other);
    }
    None
}

/// Eliminate movs whose only consumer is the block's keeps list: the keep
/// entry is rewritten to pin the producer directly.
fn eliminate_output_movs(sh: &mut Shader, block: Block) -> bool {
    let mut progress = false;
    let keeps = sh.blocks[block].keeps.clone();
    for (i, &keep) in keeps.iter().enumerate() {
        if !is_eligible_mov(sh, keep, false) || sh.insts[keep].use_count != 0 {
            continue;
        }
        let src = sh.insts[keep].srcs[0];
        if sh.regs[src].flags.intersects(RegFlags::MODS) {
            continue;
        }
        let Some(producer) = sh.ssa_def_instr(src) else {
            continue;
        };
        sh.blocks[block].keeps[i] = producer;
        sh.remove_instr(keep);
        log::trace!("cp: rewrote keep to {producer}, removed output mov {keep}");
        progress = true;
    }
    progress
}
