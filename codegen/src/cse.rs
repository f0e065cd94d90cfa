//! Common subexpression elimination.
//!
//! A simple dominator-ordered value-numbering pass over pure instructions.
//! Blocks are visited in dominator-tree preorder; each instruction first
//! remaps its sources through the replacement table, then looks itself up
//! by shape. A duplicate whose original dominates it is removed and its
//! destination redirected.

use crate::dominator_tree::DominatorTree;
use crate::fx::FxHashMap;
use crate::ir::{Inst, OpPayload, Reg, RegFlags, Shader};
use crate::timing;
use basalt_entity::{EntityRef, PackedOption, SecondaryMap};
use smallvec::SmallVec;

/// Shape of one instruction, used as the value-numbering key.
#[derive(Clone, PartialEq, Eq, Hash)]
struct InstKey {
    opcode: crate::ir::Opcode,
    flags: u16,
    payload: PayloadKey,
    srcs: SmallVec<[SrcKey; 3]>,
    dst_half: bool,
}

#[derive(Clone, PartialEq, Eq, Hash)]
enum PayloadKey {
    None,
    Mov(u8, u8, u8),
    Cmp(u8),
    Cat3,
    Split(u16),
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct SrcKey {
    flags_bits: u32,
    def: u32,
    num: u16,
    imm: u32,
    array: u32,
    array_offset: u16,
}

/// Is `inst` a candidate: pure, single plain destination, no relative or
/// array operands, no address dependency?
fn is_candidate(sh: &Shader, inst: Inst) -> bool {
    let data = &sh.insts[inst];
    if !(data.opcode.is_alu() && !data.opcode.is_input()
        || matches!(
            data.opcode,
            crate::ir::Opcode::MetaCollect | crate::ir::Opcode::MetaSplit
        ))
    {
        return false;
    }
    if data.opcode.has_side_effects() || data.address.is_some() || !data.deps.is_empty() {
        return false;
    }
    if data.dsts.len() != 1 {
        return false;
    }
    let dst = sh.regs[data.dsts[0]].flags;
    if dst.intersects(
        RegFlags::PREDICATE | RegFlags::ADDR | RegFlags::RELATIV | RegFlags::ARRAY,
    ) {
        return false;
    }
    data.srcs.iter().all(|&s| {
        !sh.regs[s]
            .flags
            .intersects(RegFlags::RELATIV | RegFlags::ARRAY)
    })
}

fn payload_key(payload: &OpPayload) -> Option<PayloadKey> {
    Some(match payload {
        OpPayload::None => PayloadKey::None,
        OpPayload::Mov {
            src_type,
            dst_type,
            round,
        } => PayloadKey::Mov(*src_type as u8, *dst_type as u8, *round as u8),
        OpPayload::Cmp { cond } => PayloadKey::Cmp(*cond as u8),
        OpPayload::Cat3 { .. } => PayloadKey::Cat3,
        OpPayload::Split { component } => PayloadKey::Split(*component),
        _ => return None,
    })
}

fn inst_key(sh: &Shader, inst: Inst, remap: &SecondaryMap<Reg, PackedOption<Reg>>) -> Option<InstKey> {
    let data = &sh.insts[inst];
    let payload = payload_key(&data.payload)?;
    let mut srcs: SmallVec<[SrcKey; 3]> = SmallVec::new();
    for &s in &data.srcs {
        let rd = &sh.regs[s];
        let def = rd
            .def
            .expand()
            .map(|d| remap[d].expand().unwrap_or(d))
            .map(|d| d.index() as u32)
            .unwrap_or(u32::MAX);
        srcs.push(SrcKey {
            flags_bits: rd.flags.bits(),
            def,
            num: rd.num,
            imm: rd.imm,
            array: rd.array.map(|a| a.index() as u32).unwrap_or(u32::MAX),
            array_offset: rd.array_offset,
        });
    }
    let mut flags = data.flags;
    flags.remove(crate::ir::InstrFlags::MARK);
    Some(InstKey {
        opcode: data.opcode,
        flags: flags.bits(),
        payload,
        srcs,
        dst_half: sh.regs[data.dsts[0]].flags.contains(RegFlags::HALF),
    })
}

/// Run CSE. Requires a valid dominator tree. Returns `true` on progress.
pub fn do_cse(sh: &mut Shader, domtree: &DominatorTree) -> bool {
    let _tt = timing::cse();
    let mut progress = false;
    // Maps a replaced destination operand to its surviving double.
    let mut remap: SecondaryMap<Reg, PackedOption<Reg>> = SecondaryMap::new();
    let mut table: FxHashMap<InstKey, (Inst, Reg)> = FxHashMap::default();

    for block in domtree.preorder() {
        let insts: Vec<Inst> = sh.layout.block_insts(block).collect();
        for inst in insts {
            // First chase sources through the replacement table.
            let srcs: SmallVec<[Reg; 3]> = sh.insts[inst].srcs.clone();
            for src in srcs {
                if let Some(def) = sh.regs[src].def.expand() {
                    if let Some(new_def) = remap[def].expand() {
                        let old_owner = sh.regs[def].instr.unwrap();
                        let new_owner = sh.regs[new_def].instr.unwrap();
                        sh.regs[src].def = new_def.into();
                        sh.insts[old_owner].use_count =
                            sh.insts[old_owner].use_count.saturating_sub(1);
                        sh.insts[new_owner].use_count += 1;
                        progress = true;
                    }
                }
            }

            // Keeps-pinned instructions must survive even as duplicates;
            // their keep entry is what the shader's outputs hang off.
            if !is_candidate(sh, inst) || sh.blocks[block].keeps.contains(&inst) {
                continue;
            }
            let Some(key) = inst_key(sh, inst, &remap) else {
                continue;
            };
            match table.get(&key) {
                Some(&(orig, orig_dst)) => {
                    let orig_block = sh.layout.inst_block(orig);
                    if orig_block.is_some_and(|ob| domtree.dominates(ob, block)) {
                        log::trace!("cse: {inst} duplicates {orig}");
                        remap[sh.insts[inst].dst()] = orig_dst.into();
                        sh.remove_instr(inst);
                        progress = true;
                    } else {
                        // The stored instance doesn't dominate us; prefer
                        // the current one for later lookups in this
                        // subtree.
                        table.insert(key, (inst, sh.insts[inst].dst()));
                    }
                }
                None => {
                    table.insert(key, (inst, sh.insts[inst].dst()));
                }
            }
        }
    }
    progress
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GpuInfo;
    use crate::cursor::{Cursor, ShaderCursor};
    use crate::flowgraph;
    use crate::ir::{NumType, Opcode, ShaderStage};

    fn shader() -> Shader {
        Shader::new(GpuInfo::default(), ShaderStage::Fragment)
    }

    #[test]
    fn identical_adds_merge() {
        let mut sh = shader();
        let block = sh.create_block();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(block);
        let x = cur.ins().input(0, false);
        let xd = cur.shader.insts[x].dst();
        let a = cur.ins().binary(Opcode::AddF, xd, xd);
        let b = cur.ins().binary(Opcode::AddF, xd, xd);
        let ad = cur.shader.insts[a].dst();
        let bd = cur.shader.insts[b].dst();
        let use_a = cur.ins().mov(NumType::F32, ad);
        let use_b = cur.ins().mov(NumType::F32, bd);
        sh.pin_keep(block, use_a);
        sh.pin_keep(block, use_b);

        flowgraph::compute(&mut sh);
        let dt = DominatorTree::with_shader(&mut sh);
        assert!(do_cse(&mut sh, &dt));
        assert!(sh.layout.inst_block(b).is_none());
        let s = sh.insts[use_b].srcs[0];
        assert_eq!(sh.ssa_def_instr(s), Some(a));
    }

    #[test]
    fn different_modifiers_do_not_merge() {
        let mut sh = shader();
        let block = sh.create_block();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(block);
        let x = cur.ins().input(0, false);
        let xd = cur.shader.insts[x].dst();
        let a = cur.ins().binary(Opcode::AddF, xd, xd);
        let b = cur.ins().binary(Opcode::AddF, xd, xd);
        let s0 = cur.shader.insts[b].srcs[0];
        cur.shader.regs[s0].flags.insert(RegFlags::FNEG);

        flowgraph::compute(&mut sh);
        let dt = DominatorTree::with_shader(&mut sh);
        do_cse(&mut sh, &dt);
        assert!(sh.layout.inst_block(a).is_some());
        assert!(sh.layout.inst_block(b).is_some());
    }

    #[test]
    fn dominating_duplicate_wins_across_blocks() {
        let mut sh = shader();
        let b0 = sh.create_block();
        let b1 = sh.create_block();
        sh.set_succs(b0, [Some(b1), None]);
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(b0);
        let x = cur.ins().input(0, false);
        let xd = cur.shader.insts[x].dst();
        let a = cur.ins().binary(Opcode::MulF, xd, xd);
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(b1);
        let b = cur.ins().binary(Opcode::MulF, xd, xd);

        flowgraph::compute(&mut sh);
        let dt = DominatorTree::with_shader(&mut sh);
        assert!(do_cse(&mut sh, &dt));
        assert!(sh.layout.inst_block(a).is_some());
        assert!(sh.layout.inst_block(b).is_none());
    }

    #[test]
    fn siblings_do_not_merge() {
        let mut sh = shader();
        let b0 = sh.create_block();
        let b1 = sh.create_block();
        let b2 = sh.create_block();
        sh.set_succs(b0, [Some(b1), Some(b2)]);
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(b0);
        let x = cur.ins().input(0, false);
        let xd = cur.shader.insts[x].dst();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(b1);
        let a = cur.ins().binary(Opcode::MulF, xd, xd);
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(b2);
        let b = cur.ins().binary(Opcode::MulF, xd, xd);

        flowgraph::compute(&mut sh);
        let dt = DominatorTree::with_shader(&mut sh);
        do_cse(&mut sh, &dt);
        assert!(sh.layout.inst_block(a).is_some());
        assert!(sh.layout.inst_block(b).is_some());
    }
}
