//! Instruction builders.
//!
//! An `InsertBuilder` wraps a cursor and provides one constructor per
//! instruction family. Every constructor allocates the instruction,
//! attaches destinations (SSA, half flag inherited from the operation's bit
//! size), attaches sources (half/shared flags inherited from the referenced
//! definitions), inserts at the cursor, and returns the new instruction.

use crate::cursor::{Cursor, ShaderCursor};
use crate::ir::entities::{Block, Inst, Reg};
use crate::ir::instr::{InstrFlags, MemInfo, OpPayload, TexInfo};
use crate::ir::reg::RegFlags;
use crate::ir::types::{NumType, RoundMode};
use crate::ir::{CondCode, Opcode};
use smallvec::SmallVec;

/// Builder inserting new instructions at a cursor position.
pub struct InsertBuilder<'c, 's> {
    cur: &'c mut ShaderCursor<'s>,
    saturate: bool,
}

impl<'c, 's> InsertBuilder<'c, 's> {
    /// Create a builder for `cur`.
    pub fn new(cur: &'c mut ShaderCursor<'s>) -> Self {
        Self {
            cur,
            saturate: false,
        }
    }

    /// Mark the next built instruction as saturating.
    pub fn sat(mut self) -> Self {
        self.saturate = true;
        self
    }

    fn finish(self, inst: Inst) -> Inst {
        if self.saturate {
            self.cur.shader.insts[inst].flags.insert(InstrFlags::SAT);
        }
        self.cur.insert_inst(inst);
        inst
    }

    fn dst_flags_for(&self, half: bool) -> RegFlags {
        if half {
            RegFlags::HALF
        } else {
            RegFlags::new()
        }
    }

    fn src_is_half(&self, def: Reg) -> bool {
        self.cur.shader.regs[def].flags.contains(RegFlags::HALF)
    }

    /// Same-type move.
    pub fn mov(self, typ: NumType, src: Reg) -> Inst {
        self.build_mov(typ, typ, RoundMode::Zero, src)
    }

    /// Type-converting move.
    pub fn cov(self, src_type: NumType, dst_type: NumType, src: Reg) -> Inst {
        self.build_mov(src_type, dst_type, RoundMode::Zero, src)
    }

    fn build_mov(self, src_type: NumType, dst_type: NumType, round: RoundMode, src: Reg) -> Inst {
        let sh = &mut self.cur.shader;
        let inst = sh.create_instr(Opcode::Mov, 1, 1);
        sh.insts[inst].payload = OpPayload::Mov {
            src_type,
            dst_type,
            round,
        };
        let flags = if dst_type.is_half() {
            RegFlags::HALF
        } else {
            RegFlags::new()
        };
        sh.make_dst(inst, flags);
        sh.make_src_ssa(inst, src);
        self.finish(inst)
    }

    /// Move of an inline immediate.
    pub fn mov_imm(self, typ: NumType, bits: u32) -> Inst {
        let sh = &mut self.cur.shader;
        let inst = sh.create_instr(Opcode::Mov, 1, 1);
        sh.insts[inst].payload = OpPayload::Mov {
            src_type: typ,
            dst_type: typ,
            round: RoundMode::Zero,
        };
        let half = typ.is_half();
        let dst_flags = if half { RegFlags::HALF } else { RegFlags::new() };
        sh.make_dst(inst, dst_flags);
        let src_flags = if half { RegFlags::HALF } else { RegFlags::new() };
        sh.make_src_imm(inst, bits, src_flags);
        self.finish(inst)
    }

    /// Move of a constant-file slot.
    pub fn mov_const(self, typ: NumType, idx: u16) -> Inst {
        let sh = &mut self.cur.shader;
        let inst = sh.create_instr(Opcode::Mov, 1, 1);
        sh.insts[inst].payload = OpPayload::Mov {
            src_type: typ,
            dst_type: typ,
            round: RoundMode::Zero,
        };
        let half = typ.is_half();
        let flags = if half { RegFlags::HALF } else { RegFlags::new() };
        sh.make_dst(inst, flags);
        sh.make_src_const(inst, idx, flags);
        self.finish(inst)
    }

    /// `absneg.f`/`absneg.s`: a mov applying float or integer modifiers.
    pub fn absneg(self, opcode: Opcode, src: Reg, mods: RegFlags) -> Inst {
        debug_assert!(matches!(opcode, Opcode::AbsnegF | Opcode::AbsnegS));
        debug_assert!(RegFlags::MODS.contains(mods));
        let sh = &mut self.cur.shader;
        let half = sh.regs[src].flags.contains(RegFlags::HALF);
        let inst = sh.create_instr(opcode, 1, 1);
        let flags = if half { RegFlags::HALF } else { RegFlags::new() };
        sh.make_dst(inst, flags);
        let s = sh.make_src_ssa(inst, src);
        sh.regs[s].flags.insert(mods);
        self.finish(inst)
    }

    /// Single-source cat2 ALU operation.
    pub fn unary(self, opcode: Opcode, a: Reg) -> Inst {
        let half = self.src_is_half(a);
        let sh = &mut self.cur.shader;
        let inst = sh.create_instr(opcode, 1, 1);
        let flags = if half { RegFlags::HALF } else { RegFlags::new() };
        sh.make_dst(inst, flags);
        sh.make_src_ssa(inst, a);
        self.finish(inst)
    }

    /// Two-source cat2 ALU operation.
    pub fn binary(self, opcode: Opcode, a: Reg, b: Reg) -> Inst {
        let half = self.src_is_half(a);
        let sh = &mut self.cur.shader;
        let inst = sh.create_instr(opcode, 1, 2);
        let flags = if half { RegFlags::HALF } else { RegFlags::new() };
        sh.make_dst(inst, flags);
        sh.make_src_ssa(inst, a);
        sh.make_src_ssa(inst, b);
        self.finish(inst)
    }

    /// Cat2 compare producing a canonical boolean.
    pub fn cmps(self, opcode: Opcode, cond: CondCode, a: Reg, b: Reg) -> Inst {
        debug_assert!(opcode.produces_bool());
        let half = self.src_is_half(a);
        let sh = &mut self.cur.shader;
        let inst = sh.create_instr(opcode, 1, 2);
        sh.insts[inst].payload = OpPayload::Cmp { cond };
        let flags = if half { RegFlags::HALF } else { RegFlags::new() };
        sh.make_dst(inst, flags);
        sh.make_src_ssa(inst, a);
        sh.make_src_ssa(inst, b);
        self.finish(inst)
    }

    /// Three-source cat3 ALU operation.
    pub fn ternary(self, opcode: Opcode, a: Reg, b: Reg, c: Reg) -> Inst {
        debug_assert_eq!(opcode.category(), crate::ir::Category::Cat3);
        let half = self.src_is_half(a);
        let sh = &mut self.cur.shader;
        let inst = sh.create_instr(opcode, 1, 3);
        sh.insts[inst].payload = OpPayload::Cat3 { swapped: false };
        let flags = if half { RegFlags::HALF } else { RegFlags::new() };
        sh.make_dst(inst, flags);
        sh.make_src_ssa(inst, a);
        sh.make_src_ssa(inst, b);
        sh.make_src_ssa(inst, c);
        self.finish(inst)
    }

    /// Cat4 special-function operation.
    pub fn sfu(self, opcode: Opcode, a: Reg) -> Inst {
        debug_assert!(opcode.is_sfu());
        let half = self.src_is_half(a);
        let sh = &mut self.cur.shader;
        let inst = sh.create_instr(opcode, 1, 1);
        let flags = if half { RegFlags::HALF } else { RegFlags::new() };
        sh.make_dst(inst, flags);
        sh.make_src_ssa(inst, a);
        self.finish(inst)
    }

    /// Cat5 texture operation with a `wrmask`-wide destination.
    pub fn tex(
        self,
        opcode: Opcode,
        info: TexInfo,
        wrmask: u16,
        half: bool,
        srcs: &[Reg],
    ) -> Inst {
        debug_assert!(opcode.is_tex());
        let sh = &mut self.cur.shader;
        let inst = sh.create_instr(opcode, 1, srcs.len());
        sh.insts[inst].payload = OpPayload::Tex(info);
        let flags = if half { RegFlags::HALF } else { RegFlags::new() };
        let dst = sh.make_dst(inst, flags);
        sh.regs[dst].wrmask = wrmask;
        sh.regs[dst].size = wrmask.count_ones() as u16;
        for &s in srcs {
            sh.make_src_ssa(inst, s);
        }
        self.finish(inst)
    }

    /// Cat6 load; `srcs` are address components.
    pub fn load(self, opcode: Opcode, info: MemInfo, components: u16, srcs: &[Reg]) -> Inst {
        debug_assert!(opcode.is_mem());
        let sh = &mut self.cur.shader;
        let inst = sh.create_instr(opcode, 1, srcs.len());
        sh.insts[inst].payload = OpPayload::Mem(info);
        let half = info.typ.is_half();
        let flags = if half { RegFlags::HALF } else { RegFlags::new() };
        let dst = sh.make_dst(inst, flags);
        if components > 1 {
            sh.regs[dst].wrmask = (1u16 << components) - 1;
            sh.regs[dst].size = components;
        }
        for &s in srcs {
            sh.make_src_ssa(inst, s);
        }
        self.finish(inst)
    }

    /// Cat6 store; no destination. The caller pins it in the block's keeps
    /// list to protect it from DCE.
    pub fn store(self, opcode: Opcode, info: MemInfo, srcs: &[Reg]) -> Inst {
        debug_assert!(opcode.is_mem());
        let sh = &mut self.cur.shader;
        let inst = sh.create_instr(opcode, 0, srcs.len());
        sh.insts[inst].payload = OpPayload::Mem(info);
        for &s in srcs {
            sh.make_src_ssa(inst, s);
        }
        self.finish(inst)
    }

    /// Varying fetch (`bary.f`): interpolates input `loc` with the
    /// barycentric coordinates `ij`.
    pub fn bary_f(self, loc: u32, ij: Reg) -> Inst {
        let sh = &mut self.cur.shader;
        let inst = sh.create_instr(Opcode::BaryF, 1, 2);
        sh.make_dst(inst, RegFlags::new());
        sh.make_src_imm(inst, loc, RegFlags::new());
        sh.make_src_ssa(inst, ij);
        sh.inputs.push(inst);
        self.finish(inst)
    }

    /// Kill: terminate fibers where `cond` is true.
    pub fn kill(self, cond: Reg) -> Inst {
        let sh = &mut self.cur.shader;
        let inst = sh.create_instr(Opcode::Kill, 0, 1);
        sh.make_src_ssa(inst, cond);
        use crate::ir::instr::BarrierMask;
        sh.insts[inst].barrier_class = BarrierMask::ACTIVE_FIBERS_W;
        sh.insts[inst].barrier_conflict =
            BarrierMask::ACTIVE_FIBERS_R | BarrierMask::ACTIVE_FIBERS_W;
        self.finish(inst)
    }

    /// Unconditional jump to the block's successor.
    pub fn jump(self, target: Block) -> Inst {
        let sh = &mut self.cur.shader;
        let inst = sh.create_instr(Opcode::Jump, 0, 0);
        sh.insts[inst].payload = OpPayload::Branch {
            target: target.into(),
        };
        self.finish(inst)
    }

    /// Conditional branch on `cond` to `target`; fall through otherwise.
    pub fn br(self, cond: Reg, target: Block) -> Inst {
        let sh = &mut self.cur.shader;
        let inst = sh.create_instr(Opcode::Br, 0, 1);
        sh.insts[inst].payload = OpPayload::Branch {
            target: target.into(),
        };
        sh.make_src_ssa(inst, cond);
        self.finish(inst)
    }

    /// Shader end.
    pub fn end(self) -> Inst {
        let sh = &mut self.cur.shader;
        let inst = sh.create_instr(Opcode::End, 0, 0);
        self.finish(inst)
    }

    /// Meta phi. `srcs[i]` is the value arriving from `blocks[i]`; `None`
    /// becomes an undefined input.
    pub fn phi(self, half: bool, srcs: &[(Block, Option<Reg>)]) -> Inst {
        let sh = &mut self.cur.shader;
        let inst = sh.create_instr(Opcode::MetaPhi, 1, srcs.len());
        let flags = if half { RegFlags::HALF } else { RegFlags::new() };
        sh.make_dst(inst, flags);
        let mut blocks: SmallVec<[Block; 2]> = SmallVec::new();
        for &(block, src) in srcs {
            blocks.push(block);
            match src {
                Some(def) => {
                    sh.make_src_ssa(inst, def);
                }
                None => {
                    sh.make_src_undef(inst);
                }
            }
        }
        sh.insts[inst].payload = OpPayload::Phi { blocks };
        self.finish(inst)
    }

    /// Meta collect: bundle scalar definitions into one vector value.
    pub fn collect(self, srcs: &[Reg]) -> Inst {
        let sh = &mut self.cur.shader;
        let inst = sh.create_instr(Opcode::MetaCollect, 1, srcs.len());
        let half = srcs
            .first()
            .is_some_and(|&s| sh.regs[s].flags.contains(RegFlags::HALF));
        let flags = if half { RegFlags::HALF } else { RegFlags::new() };
        let dst = sh.make_dst(inst, flags);
        sh.regs[dst].wrmask = (1u16 << srcs.len()) - 1;
        sh.regs[dst].size = srcs.len() as u16;
        for &s in srcs {
            sh.make_src_ssa(inst, s);
        }
        self.finish(inst)
    }

    /// Meta split: extract component `component` of a vector definition.
    /// Register allocation collapses it to nothing.
    pub fn split(self, vec: Reg, component: u16) -> Inst {
        let sh = &mut self.cur.shader;
        debug_assert!(component < sh.regs[vec].size.max(1));
        let half = sh.regs[vec].flags.contains(RegFlags::HALF);
        let inst = sh.create_instr(Opcode::MetaSplit, 1, 1);
        sh.insts[inst].payload = OpPayload::Split { component };
        let flags = if half { RegFlags::HALF } else { RegFlags::new() };
        sh.make_dst(inst, flags);
        sh.make_src_ssa(inst, vec);
        self.finish(inst)
    }

    /// Meta input marker for input slot `sysval`.
    pub fn input(self, sysval: u16, half: bool) -> Inst {
        let flags = self.dst_flags_for(half);
        let sh = &mut self.cur.shader;
        let inst = sh.create_instr(Opcode::MetaInput, 1, 0);
        sh.insts[inst].payload = OpPayload::Input { sysval };
        sh.make_dst(inst, flags);
        sh.inputs.push(inst);
        self.finish(inst)
    }

    /// Meta texture-prefetch marker.
    pub fn tex_prefetch(self, tex: u16, samp: u16, wrmask: u16) -> Inst {
        let sh = &mut self.cur.shader;
        let inst = sh.create_instr(Opcode::MetaTexPrefetch, 1, 0);
        sh.insts[inst].payload = OpPayload::TexPrefetch { tex, samp };
        let dst = sh.make_dst(inst, RegFlags::new());
        sh.regs[dst].wrmask = wrmask;
        sh.regs[dst].size = wrmask.count_ones() as u16;
        self.finish(inst)
    }
}

impl crate::ir::Shader {
    /// Link `insts` into a repeat group: each entry's `rpt_next` points at
    /// the following one. Members must already sit contiguously in one
    /// block, in creation order.
    pub fn link_rpt_group(&mut self, insts: &[Inst]) {
        debug_assert!(insts.len() >= 2 && insts.len() <= 4);
        for pair in insts.windows(2) {
            debug_assert!(
                self.insts[pair[0]].serial < self.insts[pair[1]].serial,
                "repeat group members must be in creation order"
            );
            debug_assert_eq!(
                self.layout.next_inst(pair[0]),
                Some(pair[1]),
                "repeat group members must be contiguous"
            );
            self.insts[pair[0]].rpt_next = pair[1].into();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GpuInfo;
    use crate::cursor::Cursor;
    use crate::ir::{Shader, ShaderStage};

    #[test]
    fn builder_inherits_half_flags() {
        let mut sh = Shader::new(GpuInfo::default(), ShaderStage::Fragment);
        let block = sh.create_block();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(block);
        let a = cur.ins().mov_imm(NumType::F16, 0x3c00);
        let a_dst = cur.shader.insts[a].dst();
        assert!(cur.shader.regs[a_dst].flags.contains(RegFlags::HALF));

        let b = cur.ins().unary(Opcode::FloorF, a_dst);
        let b_dst = cur.shader.insts[b].dst();
        assert!(cur.shader.regs[b_dst].flags.contains(RegFlags::HALF));
        let b_src = cur.shader.insts[b].srcs[0];
        assert!(cur.shader.regs[b_src].flags.contains(RegFlags::HALF));
    }

    #[test]
    fn saturate_marker() {
        let mut sh = Shader::new(GpuInfo::default(), ShaderStage::Fragment);
        let block = sh.create_block();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(block);
        let a = cur.ins().mov_imm(NumType::F32, 0);
        let b = cur.ins().mov_imm(NumType::F32, 0);
        let ad = cur.shader.insts[a].dst();
        let bd = cur.shader.insts[b].dst();
        let add = cur.ins().sat().binary(Opcode::AddF, ad, bd);
        assert!(cur.shader.insts[add].flags.contains(InstrFlags::SAT));
        let mul = cur.ins().binary(Opcode::MulF, ad, bd);
        assert!(!cur.shader.insts[mul].flags.contains(InstrFlags::SAT));
    }

    #[test]
    fn collect_and_split_round_trip() {
        let mut sh = Shader::new(GpuInfo::default(), ShaderStage::Compute);
        let block = sh.create_block();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(block);
        let x = cur.ins().mov_imm(NumType::U32, 1);
        let y = cur.ins().mov_imm(NumType::U32, 2);
        let xd = cur.shader.insts[x].dst();
        let yd = cur.shader.insts[y].dst();
        let vec = cur.ins().collect(&[xd, yd]);
        let vd = cur.shader.insts[vec].dst();
        assert_eq!(cur.shader.regs[vd].wrmask, 0b11);
        assert_eq!(cur.shader.regs[vd].size, 2);
        let s1 = cur.ins().split(vd, 1);
        match cur.shader.insts[s1].payload {
            OpPayload::Split { component } => assert_eq!(component, 1),
            _ => panic!("expected split payload"),
        }
        assert_eq!(cur.shader.insts[vec].use_count, 1);
    }

    #[test]
    fn phi_records_pred_blocks() {
        let mut sh = Shader::new(GpuInfo::default(), ShaderStage::Compute);
        let b0 = sh.create_block();
        let b1 = sh.create_block();
        let b2 = sh.create_block();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(b0);
        let x = cur.ins().mov_imm(NumType::U32, 1);
        let xd = cur.shader.insts[x].dst();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(b2);
        let phi = cur.ins().phi(false, &[(b0, Some(xd)), (b1, None)]);
        assert_eq!(cur.shader.phi_src_for_pred(phi, b0).is_some(), true);
        let undef = cur.shader.phi_src_for_pred(phi, b1).unwrap();
        assert!(!cur.shader.regs[undef].flags.contains(RegFlags::SSA));
    }

    #[test]
    fn rpt_group_links() {
        let mut sh = Shader::new(GpuInfo::default(), ShaderStage::Compute);
        let block = sh.create_block();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(block);
        let a = cur.ins().mov_imm(NumType::U32, 1);
        let b = cur.ins().mov_imm(NumType::U32, 2);
        let c = cur.ins().mov_imm(NumType::U32, 3);
        sh.link_rpt_group(&[a, b, c]);
        assert_eq!(sh.insts[a].rpt_next.expand(), Some(b));
        assert_eq!(sh.insts[b].rpt_next.expand(), Some(c));
        assert_eq!(sh.insts[c].rpt_next.expand(), None);
    }
}
