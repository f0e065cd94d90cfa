//! The shader: owner of all IR storage.
//!
//! A `Shader` owns the instruction, operand, block and array arenas, the
//! layout, and the constant pool. All IR edges are entity indices into
//! these arenas, so removing an instruction never invalidates anything; the
//! storage is reclaimed when the shader is dropped.

use crate::context::GpuInfo;
use crate::ir::constpool::ConstPool;
use crate::ir::entities::{ArrayVar, Block, Inst, Reg};
use crate::ir::instr::{InstData, OpPayload};
use crate::ir::layout::Layout;
use crate::ir::reg::{RegData, RegFlags, INVALID_REG};
use crate::ir::Opcode;
use basalt_entity::{PackedOption, PrimaryMap};
use smallvec::SmallVec;

/// Pipeline stage a shader runs at.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum ShaderStage {
    /// Vertex shader.
    Vertex,
    /// Tessellation control shader.
    TessCtrl,
    /// Tessellation evaluation shader.
    TessEval,
    /// Geometry shader.
    Geometry,
    /// Fragment shader.
    Fragment,
    /// Compute shader.
    Compute,
}

/// Per-block data: successor links, predecessor arrays, dominator info, and
/// the keeps list pinning side-effecting instructions against DCE.
#[derive(Clone, Default)]
pub struct BlockData {
    /// Per-thread control-flow successors. The second entry is used when
    /// the terminator branches.
    pub succs: [PackedOption<Block>; 2],
    /// Per-thread predecessors, rebuilt by `flowgraph::compute`.
    pub preds: Vec<Block>,
    /// Machine-level successors. These differ from `succs` around if/else
    /// reconvergence, where the wave falls through paths individual fibers
    /// do not take.
    pub physical_succs: [PackedOption<Block>; 2],
    /// Machine-level predecessors.
    pub physical_preds: Vec<Block>,
    /// Instructions exempt from DCE even when all destinations are dead.
    pub keeps: Vec<Inst>,
    /// Immediate dominator, filled in by `DominatorTree::compute`.
    pub imm_dom: PackedOption<Block>,
    /// Loop nesting depth.
    pub loop_depth: u16,
    /// Control flow reconverges at the top of this block.
    pub reconvergence_point: bool,
    /// The branch condition entering this block diverges across fibers.
    pub divergent_condition: bool,
    /// Block belongs to the single-fiber preamble sequence.
    pub in_preamble: bool,
    /// Pass-local scratch slot; meaningless between passes.
    pub scratch: u32,
}

/// A virtually addressed register vector accessed with relative addressing.
#[derive(Clone, Debug)]
pub struct ArrayData {
    /// Stable array id.
    pub id: u16,
    /// Element count.
    pub length: u16,
    /// Elements are half registers.
    pub half: bool,
    /// Destination operand of the most recent write, used to chain
    /// dependent accesses with false deps.
    pub last_write: PackedOption<Reg>,
    /// Post-RA base offset.
    pub base: u16,
    /// Post-RA physical register assignment.
    pub reg: u16,
}

/// A complete shader in the machine IR.
pub struct Shader {
    /// Hardware description this shader is compiled for.
    pub gpu: GpuInfo,
    /// Pipeline stage.
    pub stage: ShaderStage,
    /// Wave runs at doubled size; affects texture latency.
    pub double_wave: bool,
    /// All instructions.
    pub insts: PrimaryMap<Inst, InstData>,
    /// All register operands.
    pub regs: PrimaryMap<Reg, RegData>,
    /// All blocks.
    pub blocks: PrimaryMap<Block, BlockData>,
    /// All array variables.
    pub arrays: PrimaryMap<ArrayVar, ArrayData>,
    /// Block and instruction ordering.
    pub layout: Layout,
    /// Constant / driver-parameter pool.
    pub consts: ConstPool,
    /// Input markers and varying fetches, in creation order.
    pub inputs: Vec<Inst>,
    /// Instructions depending on an `a0` definition.
    pub a0_users: Vec<Inst>,
    /// Instructions depending on an `a1` definition.
    pub a1_users: Vec<Inst>,
    /// Textures needing the ASTC sRGB workaround.
    pub astc_srgb_texs: Vec<u16>,
    /// Textures accessed with gather4 needing swizzle fixups.
    pub tg4_texs: Vec<u16>,
    next_serial: u32,
}

impl Shader {
    /// Create an empty shader for the given target and stage.
    pub fn new(gpu: GpuInfo, stage: ShaderStage) -> Self {
        Self {
            gpu,
            stage,
            double_wave: gpu.double_wave && matches!(stage, ShaderStage::Fragment | ShaderStage::Compute),
            insts: PrimaryMap::new(),
            regs: PrimaryMap::new(),
            blocks: PrimaryMap::new(),
            arrays: PrimaryMap::new(),
            layout: Layout::new(),
            consts: ConstPool::new(),
            inputs: Vec::new(),
            a0_users: Vec::new(),
            a1_users: Vec::new(),
            astc_srgb_texs: Vec::new(),
            tg4_texs: Vec::new(),
            next_serial: 0,
        }
    }

    /// Create a new block and append it to the layout.
    pub fn create_block(&mut self) -> Block {
        let block = self.blocks.push(BlockData::default());
        self.layout.append_block(block);
        block
    }

    /// Create a new instruction with room for `ndst` destinations and
    /// `nsrc` sources. The instruction is not inserted anywhere; use a
    /// builder or the layout directly.
    pub fn create_instr(&mut self, opcode: Opcode, ndst: usize, nsrc: usize) -> Inst {
        let serial = self.next_serial;
        self.next_serial += 1;
        let mut data = InstData::new(opcode, serial);
        data.dsts.reserve(ndst);
        data.srcs.reserve(nsrc);
        self.insts.push(data)
    }

    /// Append a destination operand to `inst`. Destinations are SSA by
    /// default and point back to their creator.
    pub fn make_dst(&mut self, inst: Inst, flags: RegFlags) -> Reg {
        let mut data = RegData::with_flags(flags | RegFlags::SSA);
        data.instr = inst.into();
        let reg = self.regs.push(data);
        self.insts[inst].dsts.push(reg);
        reg
    }

    /// Append a destination with a known physical number (post-RA
    /// construction, address and predicate destinations).
    pub fn make_dst_num(&mut self, inst: Inst, num: u16, flags: RegFlags) -> Reg {
        let reg = self.make_dst(inst, flags);
        self.regs[reg].num = num;
        reg
    }

    /// Append an SSA source referencing the definition `def` (a destination
    /// operand). Half/shared flags are inherited from the definition.
    pub fn make_src_ssa(&mut self, inst: Inst, def: Reg) -> Reg {
        debug_assert!(
            self.regs[def].instr.is_some(),
            "SSA source must reference a destination operand"
        );
        let inherited = self.regs[def]
            .flags
            .intersection(RegFlags::HALF | RegFlags::SHARED);
        let mut data = RegData::with_flags(RegFlags::SSA | inherited);
        data.instr = inst.into();
        data.def = def.into();
        let reg = self.regs.push(data);
        self.insts[inst].srcs.push(reg);
        let owner = self.regs[def].instr.unwrap();
        self.insts[owner].use_count += 1;
        reg
    }

    /// Append an immediate source with the raw bits `imm`.
    pub fn make_src_imm(&mut self, inst: Inst, imm: u32, flags: RegFlags) -> Reg {
        let mut data = RegData::with_flags(flags | RegFlags::IMMED);
        data.instr = inst.into();
        data.imm = imm;
        let reg = self.regs.push(data);
        self.insts[inst].srcs.push(reg);
        reg
    }

    /// Append a constant-file source reading scalar slot `idx`.
    pub fn make_src_const(&mut self, inst: Inst, idx: u16, flags: RegFlags) -> Reg {
        let mut data = RegData::with_flags(flags | RegFlags::CONST);
        data.instr = inst.into();
        data.num = idx;
        let reg = self.regs.push(data);
        self.insts[inst].srcs.push(reg);
        reg
    }

    /// Append a raw register source with a physical number (post-RA
    /// construction).
    pub fn make_src_num(&mut self, inst: Inst, num: u16, flags: RegFlags) -> Reg {
        let mut data = RegData::with_flags(flags);
        data.instr = inst.into();
        data.num = num;
        let reg = self.regs.push(data);
        self.insts[inst].srcs.push(reg);
        reg
    }

    /// Append an undefined source (used for phi inputs with no value on
    /// some predecessor): INVALID register, SSA flag clear.
    pub fn make_src_undef(&mut self, inst: Inst) -> Reg {
        let mut data = RegData::with_flags(RegFlags::new());
        data.instr = inst.into();
        data.num = INVALID_REG;
        let reg = self.regs.push(data);
        self.insts[inst].srcs.push(reg);
        reg
    }

    /// Clone a register operand. The clone belongs to the same instruction
    /// and, for SSA sources, counts as an additional use.
    pub fn clone_reg(&mut self, reg: Reg) -> Reg {
        let data = self.regs[reg].clone();
        if let Some(def) = data.def.expand() {
            if data.flags.contains(RegFlags::SSA) {
                let owner = self.regs[def].instr.unwrap();
                self.insts[owner].use_count += 1;
            }
        }
        self.regs.push(data)
    }

    /// Clone an instruction, including operands. The clone gets a fresh
    /// serial number and is not inserted in the layout.
    pub fn clone_instr(&mut self, inst: Inst) -> Inst {
        let serial = self.next_serial;
        self.next_serial += 1;
        let mut data = self.insts[inst].clone();
        data.serial = serial;
        data.uses.clear();
        data.use_count = 0;
        let new_inst = self.insts.push(data);

        let dsts: SmallVec<[Reg; 1]> = self.insts[new_inst].dsts.clone();
        let mut new_dsts: SmallVec<[Reg; 1]> = SmallVec::new();
        for dst in dsts {
            let mut rd = self.regs[dst].clone();
            rd.instr = new_inst.into();
            new_dsts.push(self.regs.push(rd));
        }
        self.insts[new_inst].dsts = new_dsts;

        let srcs: SmallVec<[Reg; 3]> = self.insts[new_inst].srcs.clone();
        let mut new_srcs: SmallVec<[Reg; 3]> = SmallVec::new();
        for src in srcs {
            let cloned = self.clone_reg(src);
            self.regs[cloned].instr = new_inst.into();
            new_srcs.push(cloned);
        }
        self.insts[new_inst].srcs = new_srcs;

        if let Some(addr) = self.insts[new_inst].address.expand() {
            let owner = self.regs[addr].instr.unwrap();
            self.insts[owner].use_count += 1;
        }
        new_inst
    }

    /// Add an ordering-only (false) dependency from `inst` on `dep`.
    pub fn add_dep(&mut self, inst: Inst, dep: Inst) {
        if !self.insts[inst].deps.contains(&dep) {
            self.insts[inst].deps.push(dep);
        }
    }

    /// Record that `inst` reads through the address register defined by
    /// `addr_def`. An instruction may reference at most one of `a0`/`a1`.
    pub fn set_address(&mut self, inst: Inst, addr_def: Inst) {
        debug_assert!(self.insts[inst].address.is_none(), "address already set");
        let dst = self.insts[addr_def].dst();
        debug_assert!(
            self.regs[dst].flags.contains(RegFlags::ADDR),
            "address link must reference an address-register definition"
        );
        self.insts[inst].address = dst.into();
        self.insts[addr_def].use_count += 1;
        if self.regs[dst].num & 1 == 0 {
            self.a0_users.push(inst);
        } else {
            self.a1_users.push(inst);
        }
    }

    /// Drop the address-register reference of `inst`.
    pub fn clear_address(&mut self, inst: Inst) {
        if let Some(addr) = self.insts[inst].address.take() {
            let owner = self.regs[addr].instr.unwrap();
            self.insts[owner].use_count = self.insts[owner].use_count.saturating_sub(1);
            self.a0_users.retain(|&i| i != inst);
            self.a1_users.retain(|&i| i != inst);
        }
    }

    /// Create an array variable.
    pub fn create_array(&mut self, length: u16, half: bool) -> ArrayVar {
        let id = self.arrays.len() as u16;
        self.arrays.push(ArrayData {
            id,
            length,
            half,
            last_write: None.into(),
            base: 0,
            reg: INVALID_REG,
        })
    }

    /// Append a source accessing element `offset` of `array`, relative to
    /// the current address register when `relative`.
    pub fn make_src_array(
        &mut self,
        inst: Inst,
        array: ArrayVar,
        offset: u16,
        relative: bool,
    ) -> Reg {
        let mut flags = RegFlags::ARRAY;
        if relative {
            flags.insert(RegFlags::RELATIV);
        }
        if self.arrays[array].half {
            flags.insert(RegFlags::HALF);
        }
        let mut data = RegData::with_flags(flags);
        data.instr = inst.into();
        data.array = array.into();
        data.array_offset = offset;
        data.size = self.arrays[array].length;
        let reg = self.regs.push(data);
        self.insts[inst].srcs.push(reg);
        self.record_array_access(inst, array, None);
        reg
    }

    /// Chain an array access through the array's `last_write` link: the
    /// access gets a false dep on the previous writer, and a write becomes
    /// the new chain head. `write` is the accessing destination operand for
    /// writes, `None` for reads.
    pub fn record_array_access(&mut self, inst: Inst, array: ArrayVar, write: Option<Reg>) {
        if let Some(prev) = self.arrays[array].last_write.expand() {
            if let Some(owner) = self.regs[prev].instr.expand() {
                if owner != inst {
                    self.add_dep(inst, owner);
                }
            }
        }
        if let Some(dst) = write {
            debug_assert!(self.regs[dst].flags.contains(RegFlags::ARRAY));
            self.arrays[array].last_write = dst.into();
        }
    }

    /// Pin `inst` in `block`'s keeps list, exempting it from DCE.
    pub fn pin_keep(&mut self, block: Block, inst: Inst) {
        if !self.blocks[block].keeps.contains(&inst) {
            self.blocks[block].keeps.push(inst);
        }
    }

    /// Drop the use counts held by `inst`'s sources and address reference.
    pub fn unuse_srcs(&mut self, inst: Inst) {
        let srcs: SmallVec<[Reg; 3]> = self.insts[inst].srcs.clone();
        for src in srcs {
            self.unuse(src);
        }
        if let Some(addr) = self.insts[inst].address.take() {
            let owner = self.regs[addr].instr.unwrap();
            self.insts[owner].use_count = self.insts[owner].use_count.saturating_sub(1);
        }
    }

    /// Drop the use count held by one SSA source operand.
    pub fn unuse(&mut self, src: Reg) {
        let data = &self.regs[src];
        if data.flags.contains(RegFlags::SSA) {
            if let Some(def) = data.def.expand() {
                let owner = self.regs[def].instr.unwrap();
                self.insts[owner].use_count = self.insts[owner].use_count.saturating_sub(1);
            }
        }
    }

    /// Remove `inst`: unlink it from the layout and release the uses its
    /// sources hold. The storage stays in the arena until the shader is
    /// dropped.
    pub fn remove_instr(&mut self, inst: Inst) {
        if self.layout.inst_block(inst).is_some() {
            self.layout.remove_inst(inst);
        }
        self.unuse_srcs(inst);
    }

    /// The instruction producing the value of SSA source `src`, if any.
    pub fn ssa_def_instr(&self, src: Reg) -> Option<Inst> {
        let data = &self.regs[src];
        if !data.flags.contains(RegFlags::SSA) {
            return None;
        }
        data.def.expand().and_then(|d| self.regs[d].instr.expand())
    }

    /// SSA source operands of `inst`.
    pub fn ssa_sources(&self, inst: Inst) -> SmallVec<[Reg; 4]> {
        self.insts[inst]
            .srcs
            .iter()
            .copied()
            .filter(|&s| self.regs[s].flags.contains(RegFlags::SSA))
            .collect()
    }

    /// Walk through same-type movs to decide whether `def` (a destination
    /// operand) ultimately holds a canonical boolean from a compare.
    pub fn is_known_bool(&self, def: Reg) -> bool {
        let mut def = def;
        loop {
            let Some(instr) = self.regs[def].instr.expand() else {
                return false;
            };
            let data = &self.insts[instr];
            if data.opcode.produces_bool() {
                return true;
            }
            let follows = data.is_same_type_mov()
                || matches!(data.opcode, Opcode::AbsnegS | Opcode::AbsnegF);
            if !follows || data.srcs.len() != 1 {
                return false;
            }
            let src = data.srcs[0];
            if !self.regs[src].flags.contains(RegFlags::SSA) {
                return false;
            }
            match self.regs[src].def.expand() {
                Some(d) => def = d,
                None => return false,
            }
        }
    }

    /// Rebuild the `uses` sets and `use_count`s from the source operands.
    ///
    /// `include_deps` selects whether ordering-only dependencies count as
    /// uses.
    pub fn find_ssa_uses(&mut self, include_deps: bool) {
        let _tt = crate::timing::ssa_uses();
        for data in self.insts.values_mut() {
            data.uses.clear();
            data.use_count = 0;
        }
        let insts: Vec<Inst> = self.insts.keys().collect();
        for inst in insts {
            if self.layout.inst_block(inst).is_none() {
                continue;
            }
            let srcs: SmallVec<[Reg; 3]> = self.insts[inst].srcs.clone();
            for src in srcs {
                if let Some(owner) = self.ssa_def_instr(src) {
                    self.insts[owner].uses.insert(inst);
                    self.insts[owner].use_count += 1;
                }
            }
            if let Some(addr) = self.insts[inst].address.expand() {
                let owner = self.regs[addr].instr.unwrap();
                self.insts[owner].uses.insert(inst);
                self.insts[owner].use_count += 1;
            }
            if include_deps {
                let deps: SmallVec<[Inst; 2]> = self.insts[inst].deps.clone();
                for dep in deps {
                    self.insts[dep].uses.insert(inst);
                    self.insts[dep].use_count += 1;
                }
            }
        }
    }

    /// Assign the instruction-pointer field in layout order and return the
    /// instruction count.
    pub fn number_instructions(&mut self) -> u32 {
        let mut ip = 0;
        let blocks: Vec<Block> = self.layout.blocks().collect();
        for block in blocks {
            let insts: Vec<Inst> = self.layout.block_insts(block).collect();
            for inst in insts {
                self.insts[inst].ip = ip;
                ip += 1;
            }
        }
        ip
    }

    /// Set the per-thread successors of `block`. Predecessor arrays are
    /// rebuilt by `flowgraph::compute`.
    pub fn set_succs(&mut self, block: Block, succs: [Option<Block>; 2]) {
        self.blocks[block].succs = [succs[0].into(), succs[1].into()];
    }

    /// Set the machine-level successors of `block`.
    pub fn set_physical_succs(&mut self, block: Block, succs: [Option<Block>; 2]) {
        self.blocks[block].physical_succs = [succs[0].into(), succs[1].into()];
    }

    /// The terminator of `block`, if its last instruction is one.
    pub fn block_terminator(&self, block: Block) -> Option<Inst> {
        let last = self.layout.last_inst(block)?;
        if self.insts[last].opcode.is_terminator() {
            Some(last)
        } else {
            None
        }
    }

    /// Does the single-destination instruction write an address register?
    pub fn writes_addr(&self, inst: Inst) -> bool {
        self.insts[inst]
            .dsts
            .iter()
            .any(|&d| self.regs[d].flags.contains(RegFlags::ADDR))
    }

    /// Mirror of the phi payload: the phi source arriving from `pred`.
    pub fn phi_src_for_pred(&self, phi: Inst, pred: Block) -> Option<Reg> {
        match &self.insts[phi].payload {
            OpPayload::Phi { blocks } => blocks
                .iter()
                .position(|&b| b == pred)
                .map(|i| self.insts[phi].srcs[i]),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GpuInfo;
    use crate::ir::types::{NumType, RoundMode};

    fn test_shader() -> Shader {
        Shader::new(GpuInfo::default(), ShaderStage::Fragment)
    }

    fn mov_imm(sh: &mut Shader, block: Block, bits: u32) -> Inst {
        let m = sh.create_instr(Opcode::Mov, 1, 1);
        sh.insts[m].payload = OpPayload::Mov {
            src_type: NumType::F32,
            dst_type: NumType::F32,
            round: RoundMode::Zero,
        };
        sh.make_dst(m, RegFlags::new());
        sh.make_src_imm(m, bits, RegFlags::new());
        sh.layout.append_inst(m, block);
        m
    }

    #[test]
    fn use_counts_track_creation_and_removal() {
        let mut sh = test_shader();
        let block = sh.create_block();
        let a = mov_imm(&mut sh, block, 1);
        let b = sh.create_instr(Opcode::AddF, 1, 2);
        sh.make_dst(b, RegFlags::new());
        let a_dst = sh.insts[a].dst();
        sh.make_src_ssa(b, a_dst);
        sh.make_src_ssa(b, a_dst);
        sh.layout.append_inst(b, block);
        assert_eq!(sh.insts[a].use_count, 2);

        sh.remove_instr(b);
        assert_eq!(sh.insts[a].use_count, 0);
        assert_eq!(sh.layout.block_insts(block).count(), 1);
    }

    #[test]
    fn clone_instr_counts_uses() {
        let mut sh = test_shader();
        let block = sh.create_block();
        let a = mov_imm(&mut sh, block, 1);
        let b = sh.create_instr(Opcode::Rcp, 1, 1);
        sh.make_dst(b, RegFlags::new());
        let a_dst = sh.insts[a].dst();
        sh.make_src_ssa(b, a_dst);
        sh.layout.append_inst(b, block);

        let c = sh.clone_instr(b);
        assert_eq!(sh.insts[a].use_count, 2);
        assert_ne!(sh.insts[c].serial, sh.insts[b].serial);
        assert_ne!(sh.insts[c].dst(), sh.insts[b].dst());
        let c_src = sh.insts[c].srcs[0];
        assert_eq!(sh.regs[c_src].instr.expand(), Some(c));
        assert_eq!(sh.ssa_def_instr(c_src), Some(a));
    }

    #[test]
    fn find_ssa_uses_rebuilds() {
        let mut sh = test_shader();
        let block = sh.create_block();
        let a = mov_imm(&mut sh, block, 1);
        let b = sh.create_instr(Opcode::Rcp, 1, 1);
        sh.make_dst(b, RegFlags::new());
        let a_dst = sh.insts[a].dst();
        sh.make_src_ssa(b, a_dst);
        sh.layout.append_inst(b, block);

        sh.insts[a].use_count = 99;
        sh.find_ssa_uses(false);
        assert_eq!(sh.insts[a].use_count, 1);
        assert!(sh.insts[a].uses.contains(&b));
        assert_eq!(sh.insts[b].use_count, 0);
    }

    #[test]
    fn known_bool_through_mov_chain() {
        let mut sh = test_shader();
        let block = sh.create_block();
        let x = mov_imm(&mut sh, block, 5);
        let y = mov_imm(&mut sh, block, 7);
        let cmp = sh.create_instr(Opcode::CmpsS, 1, 2);
        sh.make_dst(cmp, RegFlags::new());
        let xd = sh.insts[x].dst();
        let yd = sh.insts[y].dst();
        sh.make_src_ssa(cmp, xd);
        sh.make_src_ssa(cmp, yd);
        sh.layout.append_inst(cmp, block);

        let m = sh.create_instr(Opcode::Mov, 1, 1);
        sh.insts[m].payload = OpPayload::Mov {
            src_type: NumType::U32,
            dst_type: NumType::U32,
            round: RoundMode::Zero,
        };
        sh.make_dst(m, RegFlags::new());
        let cd = sh.insts[cmp].dst();
        sh.make_src_ssa(m, cd);
        sh.layout.append_inst(m, block);

        assert!(sh.is_known_bool(sh.insts[m].dst()));
        assert!(!sh.is_known_bool(sh.insts[x].dst()));
    }

    #[test]
    fn array_accesses_chain_through_last_write() {
        let mut sh = test_shader();
        let block = sh.create_block();
        let arr = sh.create_array(4, false);

        // First write.
        let w1 = sh.create_instr(Opcode::Mov, 1, 1);
        let w1d = sh.make_dst(w1, RegFlags::ARRAY);
        sh.regs[w1d].array = arr.into();
        sh.make_src_imm(w1, 1, RegFlags::new());
        sh.layout.append_inst(w1, block);
        sh.record_array_access(w1, arr, Some(w1d));

        // Read depends on the write.
        let r = sh.create_instr(Opcode::AddU, 1, 1);
        sh.make_dst(r, RegFlags::new());
        sh.make_src_array(r, arr, 2, true);
        sh.layout.append_inst(r, block);
        assert_eq!(sh.insts[r].deps.as_slice(), &[w1]);

        // Second write depends on the first; chain head moves.
        let w2 = sh.create_instr(Opcode::Mov, 1, 1);
        let w2d = sh.make_dst(w2, RegFlags::ARRAY);
        sh.regs[w2d].array = arr.into();
        sh.make_src_imm(w2, 2, RegFlags::new());
        sh.layout.append_inst(w2, block);
        sh.record_array_access(w2, arr, Some(w2d));
        assert_eq!(sh.insts[w2].deps.as_slice(), &[w1]);
        assert_eq!(sh.arrays[arr].last_write.expand(), Some(w2d));
    }

    #[test]
    fn number_instructions_in_layout_order() {
        let mut sh = test_shader();
        let b0 = sh.create_block();
        let b1 = sh.create_block();
        let x = mov_imm(&mut sh, b0, 1);
        let y = mov_imm(&mut sh, b1, 2);
        let z = mov_imm(&mut sh, b0, 3);
        assert_eq!(sh.number_instructions(), 3);
        assert_eq!(sh.insts[x].ip, 0);
        assert_eq!(sh.insts[z].ip, 1);
        assert_eq!(sh.insts[y].ip, 2);
    }
}
