//! Shader verifier.
//!
//! Checks the structural invariants every pass is entitled to assume. The
//! verifier runs after each pass in debug builds and panics with an
//! annotated dump on the first violation; release builds never call it.

use crate::ir::{Block, Inst, OpPayload, RegFlags, Shader, INVALID_REG};
use crate::timing;

macro_rules! verify {
    ($sh:expr, $cond:expr, $($msg:tt)+) => {
        if !$cond {
            panic!(
                "shader verification failed: {}\n---- shader ----\n{}",
                format_args!($($msg)+),
                $sh.display()
            );
        }
    };
}

/// Verify all structural invariants of `sh`; panics on violation.
pub fn verify_shader(sh: &Shader) {
    let _tt = timing::verify_shader();
    for block in sh.layout.blocks() {
        verify_block(sh, block);
        for inst in sh.layout.block_insts(block) {
            verify_inst(sh, block, inst);
        }
    }
}

fn verify_block(sh: &Shader, block: Block) {
    let data = &sh.blocks[block];
    // Two successors require a branching terminator.
    if data.succs[1].is_some() {
        let term = sh.block_terminator(block);
        verify!(
            sh,
            term.is_some_and(|t| sh.insts[t].opcode.is_branch()),
            "{block} has two successors but no branching terminator"
        );
    }
    // Terminators sit at block ends.
    for inst in sh.layout.block_insts(block) {
        if sh.insts[inst].opcode.is_terminator() {
            verify!(
                sh,
                sh.layout.next_inst(inst).is_none(),
                "terminator {inst} is not the last instruction of {block}"
            );
        }
    }
    // Keeps must be inserted instructions of this shader.
    for &keep in &data.keeps {
        verify!(
            sh,
            sh.layout.inst_block(keep).is_some(),
            "{block} keeps removed instruction {keep}"
        );
    }
}

fn verify_inst(sh: &Shader, block: Block, inst: Inst) {
    let data = &sh.insts[inst];
    verify!(
        sh,
        sh.layout.inst_block(inst) == Some(block),
        "{inst} block link is stale"
    );

    // SSA sources must reference a live definition.
    for &src in &data.srcs {
        let rd = &sh.regs[src];
        if rd.flags.contains(RegFlags::SSA) {
            let def = rd.def.expand();
            verify!(sh, def.is_some(), "{inst}: SSA source without def");
            let owner = sh.regs[def.unwrap()].instr.expand();
            verify!(sh, owner.is_some(), "{inst}: SSA def without instruction");
            verify!(
                sh,
                sh.layout.inst_block(owner.unwrap()).is_some(),
                "{inst}: SSA source references removed {}",
                owner.unwrap()
            );
        }
        verify!(
            sh,
            rd.instr.expand() == Some(inst),
            "{inst}: source operand owned by another instruction"
        );
    }
    for &dst in &data.dsts {
        verify!(
            sh,
            sh.regs[dst].instr.expand() == Some(inst),
            "{inst}: destination operand owned by another instruction"
        );
    }

    // Tied operands are symmetric.
    for &reg in data.dsts.iter().chain(data.srcs.iter()) {
        if let Some(tied) = sh.regs[reg].tied.expand() {
            verify!(
                sh,
                sh.regs[tied].tied.expand() == Some(reg),
                "{inst}: tied operands are not symmetric"
            );
            verify!(
                sh,
                sh.regs[tied].instr.expand() == Some(inst),
                "{inst}: operand tied across instructions"
            );
            // After RA both ends share a register.
            let (a, b) = (&sh.regs[reg], &sh.regs[tied]);
            if a.num != INVALID_REG && b.num != INVALID_REG {
                verify!(sh, a.num == b.num, "{inst}: tied operands assigned apart");
            }
        }
    }

    // At most one address-register reference across all operands.
    let mut addr_refs = usize::from(data.address.is_some());
    for &reg in data.dsts.iter().chain(data.srcs.iter()) {
        if sh.regs[reg].flags.contains(RegFlags::ADDR) {
            addr_refs += 1;
        }
    }
    verify!(
        sh,
        addr_refs <= 1,
        "{inst} references more than one address register"
    );

    // Phis have one source per predecessor, in predecessor order.
    if let OpPayload::Phi { blocks } = &data.payload {
        verify!(
            sh,
            blocks.len() == data.srcs.len(),
            "{inst}: phi source/block arity mismatch"
        );
        let preds = &sh.blocks[block].preds;
        if !preds.is_empty() {
            verify!(
                sh,
                blocks.len() == preds.len(),
                "{inst}: phi arity does not match predecessors of {block}"
            );
            for b in blocks {
                verify!(
                    sh,
                    preds.contains(b),
                    "{inst}: phi names non-predecessor {b}"
                );
            }
        }
        // Undefined inputs are INVALID with the SSA flag clear.
        for &src in &data.srcs {
            let rd = &sh.regs[src];
            if !rd.flags.contains(RegFlags::SSA) {
                verify!(
                    sh,
                    rd.num == INVALID_REG && rd.flags.intersection(RegFlags::ROLE).is_empty(),
                    "{inst}: malformed undef phi input"
                );
            }
        }
    }

    // Repeat groups are contiguous with increasing serials.
    if let Some(next) = data.rpt_next.expand() {
        verify!(
            sh,
            sh.layout.next_inst(inst) == Some(next),
            "{inst}: repeat group is not contiguous"
        );
        verify!(
            sh,
            sh.insts[next].serial > data.serial,
            "{inst}: repeat group serials not increasing"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GpuInfo;
    use crate::cursor::{Cursor, ShaderCursor};
    use crate::flowgraph;
    use crate::ir::{NumType, Opcode, ShaderStage};

    #[test]
    fn accepts_well_formed_shader() {
        let mut sh = Shader::new(GpuInfo::default(), ShaderStage::Fragment);
        let block = sh.create_block();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(block);
        let x = cur.ins().input(0, false);
        let xd = cur.shader.insts[x].dst();
        let add = cur.ins().binary(Opcode::AddF, xd, xd);
        let ad = cur.shader.insts[add].dst();
        let out = cur.ins().mov(NumType::F32, ad);
        cur.ins().end();
        sh.pin_keep(block, out);
        verify_shader(&sh);
    }

    #[test]
    #[should_panic(expected = "SSA source references removed")]
    fn rejects_dangling_ssa_source() {
        let mut sh = Shader::new(GpuInfo::default(), ShaderStage::Fragment);
        let block = sh.create_block();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(block);
        let x = cur.ins().input(0, false);
        let xd = cur.shader.insts[x].dst();
        let _add = cur.ins().binary(Opcode::AddF, xd, xd);
        sh.layout.remove_inst(x);
        verify_shader(&sh);
    }

    #[test]
    #[should_panic(expected = "not the last instruction")]
    fn rejects_mid_block_terminator() {
        let mut sh = Shader::new(GpuInfo::default(), ShaderStage::Fragment);
        let block = sh.create_block();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(block);
        cur.ins().end();
        cur.ins().mov_imm(NumType::F32, 0);
        verify_shader(&sh);
    }

    #[test]
    #[should_panic(expected = "more than one address register")]
    fn rejects_double_address_use() {
        let mut sh = Shader::new(GpuInfo::default(), ShaderStage::Compute);
        let block = sh.create_block();
        // Two address-register sources on one instruction.
        let inst = sh.create_instr(Opcode::AddU, 1, 2);
        sh.make_dst(inst, RegFlags::new());
        sh.make_src_num(inst, 0, RegFlags::ADDR);
        sh.make_src_num(inst, 1, RegFlags::ADDR);
        sh.layout.append_inst(inst, block);
        verify_shader(&sh);
    }

    #[test]
    #[should_panic(expected = "phi arity")]
    fn rejects_phi_arity_mismatch() {
        let mut sh = Shader::new(GpuInfo::default(), ShaderStage::Fragment);
        let b0 = sh.create_block();
        let b1 = sh.create_block();
        let b2 = sh.create_block();
        sh.set_succs(b0, [Some(b2), Some(b1)]);
        sh.set_succs(b1, [Some(b2), None]);
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(b0);
        let x = cur.ins().input(0, false);
        let xd = cur.shader.insts[x].dst();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(b2);
        cur.ins().phi(false, &[(b0, Some(xd))]);
        flowgraph::compute(&mut sh);
        verify_shader(&sh);
    }
}
