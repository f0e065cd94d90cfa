//! A Dead-Code Elimination (DCE) pass.
//!
//! Dead code here means instructions that have no side effects and whose
//! result values are not used by other instructions. Instructions pinned in
//! a block's keeps list are exempt even when all their destinations are
//! dead.

use crate::ir::{Block, Inst, Shader};
use crate::timing;
use basalt_entity::SecondaryMap;
use smallvec::SmallVec;

/// Perform DCE on `sh`. Returns `true` if anything was removed.
pub fn do_dce(sh: &mut Shader) -> bool {
    let _tt = timing::dce();

    // Seed the worklist with everything that must stay: side-effecting
    // instructions, terminators, and keeps.
    let mut live: SecondaryMap<Inst, bool> = SecondaryMap::new();
    let mut worklist: Vec<Inst> = Vec::new();
    let blocks: Vec<Block> = sh.layout.blocks().collect();
    for &block in &blocks {
        for inst in sh.layout.block_insts(block) {
            let opcode = sh.insts[inst].opcode;
            if opcode.has_side_effects() || opcode.is_terminator() {
                live[inst] = true;
                worklist.push(inst);
            }
        }
        for &keep in &sh.blocks[block].keeps {
            if !live[keep] {
                live[keep] = true;
                worklist.push(keep);
            }
        }
    }

    // Propagate backwards through SSA edges and address references. False
    // deps only order instructions; they do not keep their target alive.
    while let Some(inst) = worklist.pop() {
        let srcs: SmallVec<[crate::ir::Reg; 3]> = sh.insts[inst].srcs.clone();
        for src in srcs {
            if let Some(owner) = sh.ssa_def_instr(src) {
                if !live[owner] {
                    live[owner] = true;
                    worklist.push(owner);
                }
            }
        }
        if let Some(addr) = sh.insts[inst].address.expand() {
            let owner = sh.regs[addr].instr.unwrap();
            if !live[owner] {
                live[owner] = true;
                worklist.push(owner);
            }
        }
    }

    // Sweep.
    let mut progress = false;
    for &block in &blocks {
        let insts: Vec<Inst> = sh.layout.block_insts(block).collect();
        for inst in insts {
            if !live[inst] {
                log::trace!("dce: removing {inst}");
                sh.remove_instr(inst);
                progress = true;
            }
        }
    }
    if progress {
        // Dead inputs may have been removed; drop them from the collected
        // lists so later passes don't resurrect them.
        let layout = &sh.layout;
        sh.inputs.retain(|&i| layout.inst_block(i).is_some());
        sh.a0_users.retain(|&i| layout.inst_block(i).is_some());
        sh.a1_users.retain(|&i| layout.inst_block(i).is_some());
    }
    progress
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GpuInfo;
    use crate::cursor::{Cursor, ShaderCursor};
    use crate::ir::{MemInfo, NumType, Opcode, ShaderStage};

    fn shader() -> Shader {
        Shader::new(GpuInfo::default(), ShaderStage::Fragment)
    }

    #[test]
    fn unused_alu_is_removed() {
        let mut sh = shader();
        let block = sh.create_block();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(block);
        let x = cur.ins().input(0, false);
        let xd = cur.shader.insts[x].dst();
        let dead = cur.ins().binary(Opcode::AddF, xd, xd);
        let live = cur.ins().binary(Opcode::MulF, xd, xd);
        let ld = cur.shader.insts[live].dst();
        let out = cur.ins().mov(NumType::F32, ld);
        sh.pin_keep(block, out);

        assert!(do_dce(&mut sh));
        assert!(sh.layout.inst_block(dead).is_none());
        assert!(sh.layout.inst_block(live).is_some());
        // The input feeding nothing but the dead add survives through the
        // live mul.
        assert!(sh.layout.inst_block(x).is_some());
    }

    #[test]
    fn transitively_dead_chain_is_removed() {
        let mut sh = shader();
        let block = sh.create_block();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(block);
        let x = cur.ins().input(0, false);
        let xd = cur.shader.insts[x].dst();
        let a = cur.ins().binary(Opcode::AddF, xd, xd);
        let ad = cur.shader.insts[a].dst();
        let b = cur.ins().binary(Opcode::MulF, ad, ad);
        let _bd = cur.shader.insts[b].dst();

        assert!(do_dce(&mut sh));
        assert!(sh.layout.inst_block(a).is_none());
        assert!(sh.layout.inst_block(b).is_none());
        assert!(sh.layout.inst_block(x).is_none());
        assert!(sh.inputs.is_empty());
    }

    #[test]
    fn stores_and_kills_survive() {
        let mut sh = shader();
        let block = sh.create_block();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(block);
        let x = cur.ins().input(0, false);
        let xd = cur.shader.insts[x].dst();
        let kill = cur.ins().kill(xd);
        let st = cur.ins().store(
            Opcode::Stg,
            MemInfo {
                typ: NumType::U32,
                dst_offset: 0,
                src_offset: 0,
            },
            &[xd],
        );
        let end = cur.ins().end();

        assert!(!do_dce(&mut sh));
        for inst in [x, kill, st, end] {
            assert!(sh.layout.inst_block(inst).is_some());
        }
    }

    #[test]
    fn keeps_pin_instructions_with_dead_results() {
        let mut sh = shader();
        let block = sh.create_block();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(block);
        let x = cur.ins().input(0, false);
        let xd = cur.shader.insts[x].dst();
        let pinned = cur.ins().binary(Opcode::AddF, xd, xd);
        sh.pin_keep(block, pinned);

        assert!(!do_dce(&mut sh));
        assert!(sh.layout.inst_block(pinned).is_some());
    }
}
