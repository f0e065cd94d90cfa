//! Post-RA instruction scheduling.
//!
//! After register allocation, instructions in each block are reordered to
//! hide the latency of long-running producers (SFU, texture, memory), to
//! keep the number of sync-bit stalls down, and to respect the physical
//! WAR/WAW hazards that SSA no longer expresses. Opcodes, operands and
//! register numbers are never changed; only the order, the embedded nop
//! counts, and the `ss`/`sy` bits are.
//!
//! Per block: build a dependency DAG with latency-weighted edges, then
//! repeatedly pick among the ready instructions by a priority function that
//! front-loads inputs and expensive producers and otherwise chooses the
//! cheapest instruction with the longest path to the block exit.

use crate::fx::FxHashMap;
use crate::ir::{
    file_offset, slot_width, Block, Inst, InstrFlags, NumType, OpPayload, RegFile, RegFlags,
    Shader,
};
use crate::isa;
use crate::legalize::{LegalizeState, SyncFlags};
use crate::timing;
use smallvec::SmallVec;

/// Results of a scheduling run, for the variant descriptor.
#[derive(Clone, Copy, Debug, Default)]
pub struct SchedStats {
    /// Estimated issue cycles over the longest block chain.
    pub cycles: u32,
    /// Number of `ss` bits inserted.
    pub ss_count: u32,
    /// Number of `sy` bits inserted.
    pub sy_count: u32,
}

struct SchedNode {
    inst: Inst,
    /// Unscheduled predecessor count.
    indeg: u32,
    /// Outgoing edges: (successor node index, delay-slot weight).
    edges: SmallVec<[(u32, u32); 4]>,
    /// Longest-path cost to a DAG leaf.
    max_delay: u32,
    /// Some source is produced through the `ss` path.
    has_ss_src: bool,
    /// Some source is produced through the `sy` path.
    has_sy_src: bool,
    scheduled: bool,
}

/// Per-block exit information carried to successors.
#[derive(Clone)]
struct BlockExit {
    state: LegalizeState,
    ss_delay: u32,
    sy_delay: u32,
}

/// Schedule every block of a register-allocated shader.
pub fn run(sh: &mut Shader) -> SchedStats {
    let _tt = timing::postra_sched();
    remove_self_movs(sh);

    let mut exits: FxHashMap<Block, BlockExit> = FxHashMap::default();
    let mut stats = SchedStats::default();
    let blocks: Vec<Block> = sh.layout.blocks().collect();
    for block in blocks {
        let exit = schedule_block(sh, block, &exits);
        stats.cycles = stats.cycles.max(exit.state.cycle);
        exits.insert(block, exit);
    }

    remove_subreg_noop_movs(sh);

    for inst in sh.insts.keys() {
        if sh.layout.inst_block(inst).is_none() {
            continue;
        }
        let flags = sh.insts[inst].flags;
        if flags.contains(InstrFlags::SS) {
            stats.ss_count += 1;
        }
        if flags.contains(InstrFlags::SY) {
            stats.sy_count += 1;
        }
    }
    stats
}

/// Remove type-preserving movs whose source and destination occupy the
/// same physical slot. Runs before DAG construction.
fn remove_self_movs(sh: &mut Shader) {
    let blocks: Vec<Block> = sh.layout.blocks().collect();
    for block in blocks {
        let insts: Vec<Inst> = sh.layout.block_insts(block).collect();
        for inst in insts {
            if !sh.insts[inst].is_same_type_mov()
                || sh.insts[inst].flags.contains(InstrFlags::SAT)
            {
                continue;
            }
            if let OpPayload::Mov { round, .. } = sh.insts[inst].payload {
                if round != crate::ir::RoundMode::Zero {
                    continue;
                }
            }
            let dst = sh.insts[inst].dst();
            let src = sh.insts[inst].srcs[0];
            let (df, sf) = (sh.regs[dst].flags, sh.regs[src].flags);
            if sf.intersects(RegFlags::ROLE | RegFlags::MODS)
                || df.intersects(RegFlags::ROLE)
            {
                continue;
            }
            if sh.regs[dst].num == crate::ir::INVALID_REG {
                continue;
            }
            let same_file = df.intersection(RegFlags::FILE) == sf.intersection(RegFlags::FILE);
            if same_file && sh.regs[dst].num == sh.regs[src].num {
                log::trace!("postsched: removing self-mov {inst}");
                sh.remove_instr(inst);
            }
        }
    }
}

/// Remove sub-register movs that are no-ops under the merged-register
/// mapping: a 16/32-bit integer conversion whose source and destination
/// start at the same physical slot. Runs after scheduling.
fn remove_subreg_noop_movs(sh: &mut Shader) {
    if !sh.gpu.merged_regs {
        return;
    }
    let blocks: Vec<Block> = sh.layout.blocks().collect();
    for block in blocks {
        let insts: Vec<Inst> = sh.layout.block_insts(block).collect();
        for inst in insts {
            let data = &sh.insts[inst];
            if data.opcode != crate::ir::Opcode::Mov
                || data.flags.contains(InstrFlags::SAT)
                || data.dsts.len() != 1
                || data.srcs.len() != 1
            {
                continue;
            }
            let OpPayload::Mov {
                src_type, dst_type, ..
            } = data.payload
            else {
                continue;
            };
            let bit_preserving = matches!(
                (src_type, dst_type),
                (NumType::U32, NumType::U16)
                    | (NumType::U16, NumType::U32)
                    | (NumType::S32, NumType::S16)
                    | (NumType::S16, NumType::S32)
            );
            if !bit_preserving {
                continue;
            }
            let dst = data.dsts[0];
            let src = data.srcs[0];
            let (df, sf) = (sh.regs[dst].flags, sh.regs[src].flags);
            if sf.intersects(RegFlags::ROLE | RegFlags::MODS) || df.intersects(RegFlags::ROLE) {
                continue;
            }
            if sh.regs[dst].num == crate::ir::INVALID_REG
                || sh.regs[src].num == crate::ir::INVALID_REG
            {
                continue;
            }
            let d = file_offset(df, sh.regs[dst].num, true);
            let s = file_offset(sf, sh.regs[src].num, true);
            if d == s {
                log::trace!("postsched: removing sub-register noop mov {inst}");
                sh.remove_instr(inst);
            }
        }
    }
}

fn each_phys_slot(sh: &Shader, reg: crate::ir::Reg, mut f: impl FnMut(RegFile, u32)) {
    let rd = &sh.regs[reg];
    if rd.flags.intersects(RegFlags::IMMED | RegFlags::CONST) || rd.num == crate::ir::INVALID_REG {
        return;
    }
    let merged = sh.gpu.merged_regs;
    let (file, base) = file_offset(rd.flags, rd.num, merged);
    let width = slot_width(rd.flags, merged);
    let mut mask = rd.wrmask.max(1);
    let mut comp = 0u32;
    while mask != 0 {
        if mask & 1 != 0 {
            for s in 0..width {
                f(file, base + comp * width + s);
            }
        }
        mask >>= 1;
        comp += 1;
    }
}

fn schedule_block(sh: &mut Shader, block: Block, exits: &FxHashMap<Block, BlockExit>) -> BlockExit {
    // Detach the terminator; it is re-appended at the end.
    let term = sh.block_terminator(block);
    if let Some(t) = term {
        sh.layout.remove_inst(t);
    }

    // Move every instruction to the unscheduled set.
    let insts: Vec<Inst> = sh.layout.block_insts(block).collect();
    for &inst in &insts {
        sh.layout.remove_inst(inst);
    }

    let mut nodes: Vec<SchedNode> = insts
        .iter()
        .map(|&inst| SchedNode {
            inst,
            indeg: 0,
            edges: SmallVec::new(),
            max_delay: 0,
            has_ss_src: false,
            has_sy_src: false,
            scheduled: false,
        })
        .collect();
    let index: FxHashMap<Inst, u32> = insts
        .iter()
        .enumerate()
        .map(|(i, &inst)| (inst, i as u32))
        .collect();

    build_dag(sh, &insts, &index, &mut nodes);

    // Longest path to a leaf; edges always point forward in program order,
    // so one reverse sweep suffices.
    for i in (0..nodes.len()).rev() {
        let mut best = 0;
        for &(succ, weight) in &nodes[i].edges {
            best = best.max(weight + nodes[succ as usize].max_delay);
        }
        nodes[i].max_delay = best;
    }

    // Entry state: worst case over predecessors. The preamble runs once on
    // a single fiber and leaves nothing outstanding. Predecessors not yet
    // scheduled (loop back edges) force conservative syncs.
    let mut state = LegalizeState::new(sh.gpu.merged_regs);
    let mut ss_delay = 0u32;
    let mut sy_delay = 0u32;
    let preds = sh.blocks[block].physical_preds.clone();
    let preds = if preds.is_empty() {
        sh.blocks[block].preds.clone()
    } else {
        preds
    };
    for pred in preds {
        if sh.blocks[pred].in_preamble && !sh.blocks[block].in_preamble {
            continue;
        }
        match exits.get(&pred) {
            Some(exit) => {
                state.merge(&exit.state);
                ss_delay = ss_delay.max(exit.ss_delay);
                sy_delay = sy_delay.max(exit.sy_delay);
            }
            None => state.force_syncs(),
        }
    }

    // Pick instructions one at a time.
    let mut remaining = nodes.len();
    while remaining > 0 {
        let mut heads: SmallVec<[(usize, u32, u32); 8]> = SmallVec::new();
        for (i, node) in nodes.iter().enumerate() {
            if node.scheduled || node.indeg != 0 {
                continue;
            }
            let delay = state.delay(sh, node.inst);
            let mut soft = delay;
            if node.has_ss_src {
                soft = soft.max(ss_delay);
            }
            if node.has_sy_src {
                soft = soft.max(sy_delay);
            }
            heads.push((i, delay, soft));
        }
        debug_assert!(!heads.is_empty(), "dependency cycle in scheduler DAG");

        let choice = choose(sh, &nodes, &heads);
        let (idx, delay, _soft) = heads[choice];
        let inst = nodes[idx].inst;

        let sync = state.needs_sync(sh, inst);
        if sync.ss {
            sh.insts[inst].flags.insert(InstrFlags::SS);
        }
        if sync.sy {
            sh.insts[inst].flags.insert(InstrFlags::SY);
        }
        sh.insts[inst].nop = delay.min(5) as u8;
        sh.layout.append_inst(inst, block);
        state.schedule(sh, inst, sync, delay);

        // Block-level producer countdowns.
        let opcode = sh.insts[inst].opcode;
        if opcode.is_ss_producer() {
            ss_delay = isa::soft_ss_delay(sh, inst);
        } else if nodes[idx].has_ss_src {
            ss_delay = 0;
        } else {
            ss_delay = ss_delay.saturating_sub(1);
        }
        if opcode.is_sy_producer() {
            sy_delay = isa::soft_sy_delay(sh, inst);
        } else if nodes[idx].has_sy_src {
            sy_delay = 0;
        } else {
            sy_delay = sy_delay.saturating_sub(1);
        }

        nodes[idx].scheduled = true;
        remaining -= 1;
        let edges = nodes[idx].edges.clone();
        for (succ, _) in edges {
            nodes[succ as usize].indeg -= 1;
        }
        log::trace!("postsched: picked {inst} (delay {delay})");
    }

    // The terminator goes last and is legalized like everything else.
    if let Some(t) = term {
        let delay = state.delay(sh, t);
        let sync = state.needs_sync(sh, t);
        if sync.ss {
            sh.insts[t].flags.insert(InstrFlags::SS);
        }
        if sync.sy {
            sh.insts[t].flags.insert(InstrFlags::SY);
        }
        sh.insts[t].nop = delay.min(5) as u8;
        sh.layout.append_inst(t, block);
        state.schedule(sh, t, sync, delay);
    }

    BlockExit {
        state,
        ss_delay,
        sy_delay,
    }
}

fn add_edge(nodes: &mut [SchedNode], from: u32, to: u32, weight: u32) {
    debug_assert!(from < to, "scheduler edges must point forward");
    nodes[from as usize].edges.push((to, weight));
    nodes[to as usize].indeg += 1;
}

fn build_dag(sh: &Shader, insts: &[Inst], index: &FxHashMap<Inst, u32>, nodes: &mut [SchedNode]) {
    // Forward sweep: RAW edges from the last writer of each slot, WAW
    // edges between writers.
    let mut last_writer: FxHashMap<(RegFile, u32), u32> = FxHashMap::default();
    for (i, &inst) in insts.iter().enumerate() {
        let i = i as u32;
        let srcs: SmallVec<[crate::ir::Reg; 3]> = sh.insts[inst].srcs.clone();
        for (n, &src) in srcs.iter().enumerate() {
            let mut producers: SmallVec<[u32; 2]> = SmallVec::new();
            each_phys_slot(sh, src, |file, off| {
                if let Some(&w) = last_writer.get(&(file, off)) {
                    if !producers.contains(&w) {
                        producers.push(w);
                    }
                }
            });
            for w in producers {
                let weight = isa::soft_required_delay(sh, insts[w as usize], inst, n);
                let wop = sh.insts[insts[w as usize]].opcode;
                if wop.is_ss_producer() {
                    nodes[i as usize].has_ss_src = true;
                }
                if wop.is_sy_producer() {
                    nodes[i as usize].has_sy_src = true;
                }
                add_edge(nodes, w, i, weight);
            }
        }
        for &dst in &sh.insts[inst].dsts {
            let mut prev: SmallVec<[u32; 2]> = SmallVec::new();
            each_phys_slot(sh, dst, |file, off| {
                if let Some(&w) = last_writer.get(&(file, off)) {
                    if w != i && !prev.contains(&w) {
                        prev.push(w);
                    }
                }
            });
            for w in prev {
                add_edge(nodes, w, i, 0);
            }
            each_phys_slot(sh, dst, |file, off| {
                last_writer.insert((file, off), i);
            });
        }
    }

    // Reverse sweep: write-after-read edges. Walking backwards, track the
    // next writer of each slot; every earlier reader must precede it.
    let mut next_writer: FxHashMap<(RegFile, u32), u32> = FxHashMap::default();
    for (i, &inst) in insts.iter().enumerate().rev() {
        let i = i as u32;
        for &src in &sh.insts[inst].srcs {
            let mut writers: SmallVec<[u32; 2]> = SmallVec::new();
            each_phys_slot(sh, src, |file, off| {
                if let Some(&w) = next_writer.get(&(file, off)) {
                    if w != i && !writers.contains(&w) {
                        writers.push(w);
                    }
                }
            });
            for w in writers {
                add_edge(nodes, i, w, 0);
            }
        }
        for &dst in &sh.insts[inst].dsts {
            each_phys_slot(sh, dst, |file, off| {
                next_writer.insert((file, off), i);
            });
        }
    }

    // ISA ordering rules: every input fetch precedes every later kill, and
    // every kill precedes later texture/memory work.
    let mut input_idxs: SmallVec<[u32; 8]> = SmallVec::new();
    let mut kill_idxs: SmallVec<[u32; 4]> = SmallVec::new();
    for (i, &inst) in insts.iter().enumerate() {
        let i = i as u32;
        let opcode = sh.insts[inst].opcode;
        if opcode.is_kill() {
            for &input in &input_idxs {
                add_edge(nodes, input, i, 0);
            }
            kill_idxs.push(i);
        }
        if opcode.is_input() {
            input_idxs.push(i);
        }
        if opcode.is_tex() || opcode.is_mem() {
            for &kill in &kill_idxs {
                add_edge(nodes, kill, i, 0);
            }
        }
    }

    // False deps from the IR (array aliasing, barrier ordering).
    for (i, &inst) in insts.iter().enumerate() {
        let i = i as u32;
        for &dep in &sh.insts[inst].deps {
            if let Some(&d) = index.get(&dep) {
                if d < i {
                    add_edge(nodes, d, i, 0);
                }
            }
        }
    }
}

/// The priority function: choose one of `heads` (node index, delay, soft
/// delay). Ties break toward longer `max_delay`, then lower serial number.
fn choose(sh: &Shader, nodes: &[SchedNode], heads: &[(usize, u32, u32)]) -> usize {
    // Rank candidates by (class, max_delay, serial). Lower class wins;
    // within a class higher max_delay wins, then lower serial.
    let classify = |&(idx, delay, soft): &(usize, u32, u32)| -> Option<u32> {
        let node = &nodes[idx];
        let opcode = sh.insts[node.inst].opcode;
        if opcode.is_head_meta() {
            Some(0)
        } else if opcode.is_input() {
            Some(1)
        } else if opcode.is_kill() && delay == 0 {
            Some(2)
        } else if (opcode.is_ss_producer() || opcode.is_sy_producer()) && soft == 0 {
            Some(3)
        } else {
            None
        }
    };

    let mut best: Option<(usize, u32, u32, u32)> = None; // (heads idx, class, max_delay, serial)
    for (hi, head) in heads.iter().enumerate() {
        if let Some(class) = classify(head) {
            let node = &nodes[head.0];
            let serial = sh.insts[node.inst].serial;
            let better = match best {
                None => true,
                Some((_, bc, bm, bs)) => {
                    (class, core::cmp::Reverse(node.max_delay), serial)
                        < (bc, core::cmp::Reverse(bm), bs)
                }
            };
            if better {
                best = Some((hi, class, node.max_delay, serial));
            }
        }
    }
    if let Some((hi, ..)) = best {
        return hi;
    }

    // Tolerate a few nops now to avoid bigger stalls later: smallest soft
    // delay up to 3.
    let mut best: Option<(usize, u32, u32, u32)> = None; // (heads idx, soft, max_delay, serial)
    for (hi, &(idx, _delay, soft)) in heads.iter().enumerate() {
        if soft > 3 {
            continue;
        }
        let node = &nodes[idx];
        let serial = sh.insts[node.inst].serial;
        let better = match best {
            None => true,
            Some((_, bsoft, bm, bs)) => {
                (soft, core::cmp::Reverse(node.max_delay), serial)
                    < (bsoft, core::cmp::Reverse(bm), bs)
            }
        };
        if better {
            best = Some((hi, soft, node.max_delay, serial));
        }
    }
    if let Some((hi, ..)) = best {
        return hi;
    }

    // Fall back to the longest path.
    let mut best = 0;
    for (hi, &(idx, ..)) in heads.iter().enumerate() {
        let node = &nodes[idx];
        let serial = sh.insts[node.inst].serial;
        let b = &nodes[heads[best].0];
        let bserial = sh.insts[b.inst].serial;
        if (core::cmp::Reverse(node.max_delay), serial) < (core::cmp::Reverse(b.max_delay), bserial)
        {
            best = hi;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GpuInfo;
    use crate::ir::{NumType, OpPayload, Opcode, RoundMode, ShaderStage};

    fn shader() -> Shader {
        Shader::new(GpuInfo::default(), ShaderStage::Fragment)
    }

    /// Post-RA ALU helper: `opcode dst, srcs...` with physical numbers.
    fn alu(sh: &mut Shader, block: Block, opcode: Opcode, dst: u16, srcs: &[u16]) -> Inst {
        let inst = sh.create_instr(opcode, 1, srcs.len());
        let d = sh.make_dst(inst, RegFlags::new());
        sh.regs[d].num = dst;
        for &n in srcs {
            sh.make_src_num(inst, n, RegFlags::new());
        }
        sh.layout.append_inst(inst, block);
        inst
    }

    fn sam(sh: &mut Shader, block: Block, dst: u16, src: u16) -> Inst {
        let inst = sh.create_instr(Opcode::Sam, 1, 1);
        let d = sh.make_dst(inst, RegFlags::new());
        sh.regs[d].num = dst;
        sh.make_src_num(inst, src, RegFlags::new());
        sh.layout.append_inst(inst, block);
        inst
    }

    fn block_order(sh: &Shader, block: Block) -> Vec<Inst> {
        sh.layout.block_insts(block).collect()
    }

    /// S4: an independent add moves between a texture fetch and its
    /// consumer, which carries the sy bit.
    #[test]
    fn independent_work_fills_tex_shadow() {
        let mut sh = shader();
        let block = sh.create_block();
        let tex = sam(&mut sh, block, 0, 40);
        let dep = alu(&mut sh, block, Opcode::AddF, 16, &[0, 20]);
        let indep = alu(&mut sh, block, Opcode::AddF, 4, &[8, 12]);

        run(&mut sh);
        let order = block_order(&sh, block);
        assert_eq!(order, vec![tex, indep, dep]);
        assert!(sh.insts[dep].flags.contains(InstrFlags::SY));
        assert!(!sh.insts[indep].flags.contains(InstrFlags::SY));
    }

    /// S5: inputs precede the kill, texture work follows it.
    #[test]
    fn kill_ordering_against_inputs_and_tex() {
        let mut sh = shader();
        let block = sh.create_block();

        // Two varying fetches feeding nothing the kill reads.
        let b0 = {
            let inst = sh.create_instr(Opcode::BaryF, 1, 2);
            let d = sh.make_dst(inst, RegFlags::new());
            sh.regs[d].num = 0;
            sh.make_src_imm(inst, 0, RegFlags::new());
            sh.make_src_num(inst, 60, RegFlags::new());
            sh.layout.append_inst(inst, block);
            inst
        };
        let b1 = {
            let inst = sh.create_instr(Opcode::BaryF, 1, 2);
            let d = sh.make_dst(inst, RegFlags::new());
            sh.regs[d].num = 4;
            sh.make_src_imm(inst, 1, RegFlags::new());
            sh.make_src_num(inst, 60, RegFlags::new());
            sh.layout.append_inst(inst, block);
            inst
        };
        let kill = {
            let inst = sh.create_instr(Opcode::Kill, 0, 1);
            sh.make_src_num(inst, 8, RegFlags::new());
            sh.layout.append_inst(inst, block);
            inst
        };
        let tex = sam(&mut sh, block, 12, 0);

        run(&mut sh);
        let order = block_order(&sh, block);
        let pos = |i: Inst| order.iter().position(|&x| x == i).unwrap();
        assert!(pos(b0) < pos(kill));
        assert!(pos(b1) < pos(kill));
        assert!(pos(kill) < pos(tex));
    }

    /// S6: a lone self-mov disappears before scheduling.
    #[test]
    fn self_mov_removed() {
        let mut sh = shader();
        let block = sh.create_block();
        let mov = {
            let inst = sh.create_instr(Opcode::Mov, 1, 1);
            sh.insts[inst].payload = OpPayload::Mov {
                src_type: NumType::U32,
                dst_type: NumType::U32,
                round: RoundMode::Zero,
            };
            let d = sh.make_dst(inst, RegFlags::new());
            sh.regs[d].num = 5; // r1.y
            sh.make_src_num(inst, 5, RegFlags::new());
            sh.layout.append_inst(inst, block);
            inst
        };

        run(&mut sh);
        assert!(sh.layout.inst_block(mov).is_none());
        assert_eq!(block_order(&sh, block).len(), 0);
    }

    #[test]
    fn schedule_is_a_permutation_preserving_dataflow() {
        let mut sh = shader();
        let block = sh.create_block();
        let a = alu(&mut sh, block, Opcode::AddF, 0, &[40]);
        let b = alu(&mut sh, block, Opcode::MulF, 4, &[0]);
        let c = alu(&mut sh, block, Opcode::AddF, 8, &[44]);
        let d = alu(&mut sh, block, Opcode::MulF, 12, &[4, 8]);

        run(&mut sh);
        let order = block_order(&sh, block);
        let mut sorted = order.clone();
        sorted.sort();
        let mut expect = vec![a, b, c, d];
        expect.sort();
        assert_eq!(sorted, expect);
        let pos = |i: Inst| order.iter().position(|&x| x == i).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(b) < pos(d));
        assert!(pos(c) < pos(d));
    }

    #[test]
    fn terminator_stays_last() {
        let mut sh = shader();
        let block = sh.create_block();
        let a = alu(&mut sh, block, Opcode::AddF, 0, &[40]);
        let end = {
            let inst = sh.create_instr(Opcode::End, 0, 0);
            sh.layout.append_inst(inst, block);
            inst
        };
        let b = alu(&mut sh, block, Opcode::MulF, 4, &[44]);
        // Hand-misplaced terminator: move it to the end for the test
        // setup to be valid.
        sh.layout.remove_inst(end);
        sh.layout.append_inst(end, block);

        run(&mut sh);
        let order = block_order(&sh, block);
        assert_eq!(*order.last().unwrap(), end);
        assert!(order.contains(&a) && order.contains(&b));
    }

    #[test]
    fn war_hazard_not_reordered() {
        let mut sh = shader();
        let block = sh.create_block();
        // reader uses r0 (num 0); writer clobbers it afterwards.
        let reader = alu(&mut sh, block, Opcode::AddF, 8, &[0]);
        let writer = alu(&mut sh, block, Opcode::MulF, 0, &[44]);

        run(&mut sh);
        let order = block_order(&sh, block);
        let pos = |i: Inst| order.iter().position(|&x| x == i).unwrap();
        assert!(pos(reader) < pos(writer));
    }

    #[test]
    fn waw_order_preserved() {
        let mut sh = shader();
        let block = sh.create_block();
        let w1 = alu(&mut sh, block, Opcode::AddF, 0, &[40]);
        let w2 = alu(&mut sh, block, Opcode::MulF, 0, &[44]);
        let reader = alu(&mut sh, block, Opcode::AddF, 8, &[0]);

        run(&mut sh);
        let order = block_order(&sh, block);
        let pos = |i: Inst| order.iter().position(|&x| x == i).unwrap();
        assert!(pos(w1) < pos(w2));
        assert!(pos(w2) < pos(reader));
    }

    #[test]
    fn false_deps_are_honored() {
        let mut sh = shader();
        let block = sh.create_block();
        let store = {
            let inst = sh.create_instr(Opcode::Stl, 0, 1);
            sh.insts[inst].payload = OpPayload::Mem(crate::ir::MemInfo {
                typ: NumType::U32,
                dst_offset: 0,
                src_offset: 0,
            });
            sh.make_src_num(inst, 0, RegFlags::new());
            sh.layout.append_inst(inst, block);
            inst
        };
        let load = {
            let inst = sh.create_instr(Opcode::Ldl, 1, 1);
            sh.insts[inst].payload = OpPayload::Mem(crate::ir::MemInfo {
                typ: NumType::U32,
                dst_offset: 0,
                src_offset: 0,
            });
            let d = sh.make_dst(inst, RegFlags::new());
            sh.regs[d].num = 8;
            sh.make_src_num(inst, 4, RegFlags::new());
            sh.layout.append_inst(inst, block);
            inst
        };
        sh.add_dep(load, store);
        sh.pin_keep(block, store);

        run(&mut sh);
        let order = block_order(&sh, block);
        let pos = |i: Inst| order.iter().position(|&x| x == i).unwrap();
        assert!(pos(store) < pos(load));
    }

    #[test]
    fn stats_count_sync_bits() {
        let mut sh = shader();
        let block = sh.create_block();
        let _tex = sam(&mut sh, block, 0, 40);
        let _dep = alu(&mut sh, block, Opcode::AddF, 16, &[0]);
        let stats = run(&mut sh);
        assert_eq!(stats.sy_count, 1);
        assert!(stats.cycles > 0);
    }
}
