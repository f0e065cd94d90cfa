//! Legalize state: the scheduler's model of outstanding hazards.
//!
//! After register allocation the SSA graph no longer captures every
//! dependency; the hardware tracks results in flight per physical
//! register. This state mirrors that: which registers have pending
//! `ss`/`sy` results, which registers an in-flight producer still has to
//! read (write-after-read hazards), and the cycle each register becomes
//! readable without a nop.

use crate::fx::FxHashMap;
use crate::ir::{file_offset, slot_width, Inst, RegFile, RegFlags, RegMask, Shader};
use crate::isa;
use smallvec::SmallVec;

/// Sync bits an instruction must carry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncFlags {
    /// Wait for SFU/local-memory results.
    pub ss: bool,
    /// Wait for texture/global-memory results.
    pub sy: bool,
}

/// Per-block (and merged across blocks) hazard state.
#[derive(Clone)]
pub struct LegalizeState {
    /// Registers with an outstanding `ss`-path result.
    needs_ss: RegMask,
    /// Registers an outstanding `ss`-path producer still reads.
    needs_ss_war: RegMask,
    /// Registers with an outstanding `sy`-path result.
    needs_sy: RegMask,
    /// Registers an outstanding `sy`-path producer still reads.
    needs_sy_war: RegMask,
    /// Cycle each register slot is ready for an ALU consumer.
    ready_alu: FxHashMap<(RegFile, u32), u32>,
    /// Cycle each register slot is ready for a non-ALU consumer.
    ready_other: FxHashMap<(RegFile, u32), u32>,
    /// Cycle the predicate registers settle.
    pred_ready: u32,
    /// Cycle each address register settles.
    addr_ready: [u32; 2],
    /// Conservatively demand an `ss` on the next eligible instruction.
    force_ss: bool,
    /// Conservatively demand a `sy` on the next eligible instruction.
    force_sy: bool,
    /// Current issue cycle.
    pub cycle: u32,
}

impl LegalizeState {
    /// Fresh state for a target in the given register mode.
    pub fn new(merged: bool) -> Self {
        Self {
            needs_ss: RegMask::new(merged),
            needs_ss_war: RegMask::new(merged),
            needs_sy: RegMask::new(merged),
            needs_sy_war: RegMask::new(merged),
            ready_alu: FxHashMap::default(),
            ready_other: FxHashMap::default(),
            pred_ready: 0,
            addr_ready: [0, 0],
            force_ss: false,
            force_sy: false,
            cycle: 0,
        }
    }

    /// Merge a predecessor's exit state into this block's entry state.
    pub fn merge(&mut self, other: &LegalizeState) {
        self.needs_ss.union(&other.needs_ss);
        self.needs_ss_war.union(&other.needs_ss_war);
        self.needs_sy.union(&other.needs_sy);
        self.needs_sy_war.union(&other.needs_sy_war);
        for (&k, &v) in &other.ready_alu {
            let e = self.ready_alu.entry(k).or_insert(0);
            *e = (*e).max(v);
        }
        for (&k, &v) in &other.ready_other {
            let e = self.ready_other.entry(k).or_insert(0);
            *e = (*e).max(v);
        }
        self.pred_ready = self.pred_ready.max(other.pred_ready);
        self.addr_ready[0] = self.addr_ready[0].max(other.addr_ready[0]);
        self.addr_ready[1] = self.addr_ready[1].max(other.addr_ready[1]);
        self.force_ss |= other.force_ss;
        self.force_sy |= other.force_sy;
        self.cycle = self.cycle.max(other.cycle);
    }

    /// Demand conservative syncs; used when a predecessor's state is
    /// unknown (loop back edges).
    pub fn force_syncs(&mut self) {
        self.force_ss = true;
        self.force_sy = true;
    }

    fn each_slot(
        sh: &Shader,
        reg: crate::ir::Reg,
        merged: bool,
        mut f: impl FnMut(RegFile, u32),
    ) {
        let rd = &sh.regs[reg];
        if rd.flags.intersects(RegFlags::IMMED | RegFlags::CONST) || rd.num == crate::ir::INVALID_REG
        {
            return;
        }
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

    /// Cycles of nop needed before `inst` can issue, given current
    /// register readiness.
    pub fn delay(&self, sh: &Shader, inst: Inst) -> u32 {
        let merged = sh.gpu.merged_regs;
        let alu = sh.insts[inst].opcode.is_alu();
        let mut d = 0u32;
        let srcs: SmallVec<[crate::ir::Reg; 3]> = sh.insts[inst].srcs.clone();
        for src in srcs {
            let rd = &sh.regs[src];
            if rd.flags.contains(RegFlags::RELATIV) {
                let idx = (rd.num & 1) as usize;
                d = d.max(self.addr_ready[idx].saturating_sub(self.cycle));
                continue;
            }
            if rd.flags.contains(RegFlags::PREDICATE) {
                d = d.max(self.pred_ready.saturating_sub(self.cycle));
                continue;
            }
            let table = if alu { &self.ready_alu } else { &self.ready_other };
            Self::each_slot(sh, src, merged, |file, off| {
                if let Some(&ready) = table.get(&(file, off)) {
                    d = d.max(ready.saturating_sub(self.cycle));
                }
            });
        }
        if sh.insts[inst].address.is_some() {
            // Reading through a0/a1.
            let a = self.addr_ready[0].max(self.addr_ready[1]);
            d = d.max(a.saturating_sub(self.cycle));
        }
        d
    }

    /// The sync bits `inst` must carry if issued now.
    pub fn needs_sync(&self, sh: &Shader, inst: Inst) -> SyncFlags {
        let data = &sh.insts[inst];
        if data.opcode.is_meta() {
            return SyncFlags::default();
        }
        let mut out = SyncFlags {
            ss: self.force_ss,
            sy: self.force_sy,
        };
        for &src in &data.srcs {
            let rd = &sh.regs[src];
            if rd.flags.intersects(RegFlags::IMMED | RegFlags::CONST)
                || rd.num == crate::ir::INVALID_REG
            {
                continue;
            }
            if self.needs_ss.intersects(rd.flags, rd.num, rd.wrmask) {
                out.ss = true;
            }
            if self.needs_sy.intersects(rd.flags, rd.num, rd.wrmask) {
                out.sy = true;
            }
        }
        for &dst in &data.dsts {
            let rd = &sh.regs[dst];
            if rd.num == crate::ir::INVALID_REG {
                continue;
            }
            // Overwriting a pending result (WAW) or a register an
            // in-flight producer still reads (WAR).
            if self.needs_ss.intersects(rd.flags, rd.num, rd.wrmask)
                || self.needs_ss_war.intersects(rd.flags, rd.num, rd.wrmask)
            {
                out.ss = true;
            }
            if self.needs_sy.intersects(rd.flags, rd.num, rd.wrmask)
                || self.needs_sy_war.intersects(rd.flags, rd.num, rd.wrmask)
            {
                out.sy = true;
            }
        }
        out
    }

    /// Account for issuing `inst` with the given sync bits after `delay`
    /// cycles of nop.
    pub fn schedule(&mut self, sh: &Shader, inst: Inst, sync: SyncFlags, delay: u32) {
        let merged = sh.gpu.merged_regs;
        let data = &sh.insts[inst];
        let opcode = data.opcode;

        if sync.ss {
            self.needs_ss.reset();
            self.needs_ss_war.reset();
            self.force_ss = false;
        }
        if sync.sy {
            self.needs_sy.reset();
            self.needs_sy_war.reset();
            self.force_sy = false;
        }

        self.cycle += 1 + delay;

        // A long-latency producer reads its sources some cycles after
        // issue; overwriting them before it does needs a wait.
        if opcode.is_war_hazard_producer() {
            let war = if opcode.is_ss_producer() {
                &mut self.needs_ss_war
            } else {
                &mut self.needs_sy_war
            };
            for &src in &data.srcs {
                let rd = &sh.regs[src];
                if rd.flags.intersects(RegFlags::IMMED | RegFlags::CONST)
                    || rd.num == crate::ir::INVALID_REG
                {
                    continue;
                }
                war.set(rd.flags, rd.num, rd.wrmask);
            }
        }

        for &dst in &data.dsts {
            let rd = &sh.regs[dst];
            if rd.num == crate::ir::INVALID_REG {
                continue;
            }
            if rd.flags.contains(RegFlags::PREDICATE) {
                self.pred_ready = self.cycle + isa::delays::predicate_latency();
                continue;
            }
            if rd.flags.contains(RegFlags::ADDR) {
                self.addr_ready[(rd.num & 1) as usize] =
                    self.cycle + isa::instr_latency(sh, inst, false);
                continue;
            }
            if opcode.is_ss_producer() {
                self.needs_ss.set(rd.flags, rd.num, rd.wrmask);
            }
            if opcode.is_sy_producer() {
                self.needs_sy.set(rd.flags, rd.num, rd.wrmask);
            }
            let alu_ready = self.cycle + isa::instr_latency(sh, inst, true);
            let other_ready = self.cycle + isa::instr_latency(sh, inst, false);
            Self::each_slot(sh, dst, merged, |file, off| {
                let e = self.ready_alu.entry((file, off)).or_insert(0);
                *e = (*e).max(alu_ready);
                let e = self.ready_other.entry((file, off)).or_insert(0);
                *e = (*e).max(other_ready);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GpuInfo;
    use crate::ir::{OpPayload, Opcode, Shader, ShaderStage};

    fn shader() -> Shader {
        Shader::new(GpuInfo::default(), ShaderStage::Fragment)
    }

    /// Build a post-RA ALU op writing `dst_num` and reading `src_nums`.
    fn alu(sh: &mut Shader, opcode: Opcode, dst_num: u16, src_nums: &[u16]) -> Inst {
        let inst = sh.create_instr(opcode, 1, src_nums.len());
        let d = sh.make_dst(inst, RegFlags::new());
        sh.regs[d].num = dst_num;
        for &n in src_nums {
            sh.make_src_num(inst, n, RegFlags::new());
        }
        inst
    }

    fn sam(sh: &mut Shader, dst_num: u16, src_num: u16) -> Inst {
        let inst = sh.create_instr(Opcode::Sam, 1, 1);
        let d = sh.make_dst(inst, RegFlags::new());
        sh.regs[d].num = dst_num;
        sh.regs[d].wrmask = 0xf;
        sh.make_src_num(inst, src_num, RegFlags::new());
        inst
    }

    #[test]
    fn raw_dependency_needs_delay() {
        let mut sh = shader();
        let mut st = LegalizeState::new(sh.gpu.merged_regs);
        let a = alu(&mut sh, Opcode::AddF, 4, &[0]);
        let b = alu(&mut sh, Opcode::MulF, 8, &[4]);
        st.schedule(&sh, a, SyncFlags::default(), 0);
        // ALU to ALU forwarding: 3 cycles.
        assert_eq!(st.delay(&sh, b), 3);
        st.cycle += 3;
        assert_eq!(st.delay(&sh, b), 0);
    }

    #[test]
    fn sy_producer_marks_consumer() {
        let mut sh = shader();
        let mut st = LegalizeState::new(sh.gpu.merged_regs);
        let s = sam(&mut sh, 4, 0);
        let dep = alu(&mut sh, Opcode::AddF, 12, &[4]);
        let indep = alu(&mut sh, Opcode::AddF, 16, &[0]);
        st.schedule(&sh, s, SyncFlags::default(), 0);
        assert_eq!(st.needs_sync(&sh, dep), SyncFlags { ss: false, sy: true });
        assert_eq!(st.needs_sync(&sh, indep), SyncFlags::default());
        // No nop delay: the wait is the sync bit.
        assert_eq!(st.delay(&sh, dep), 0);
    }

    #[test]
    fn sync_consumes_whole_mask() {
        let mut sh = shader();
        let mut st = LegalizeState::new(sh.gpu.merged_regs);
        let s1 = sam(&mut sh, 4, 0);
        let s2 = sam(&mut sh, 8, 0);
        let dep1 = alu(&mut sh, Opcode::AddF, 16, &[4]);
        let dep2 = alu(&mut sh, Opcode::AddF, 20, &[8]);
        st.schedule(&sh, s1, SyncFlags::default(), 0);
        st.schedule(&sh, s2, SyncFlags::default(), 0);
        let sync = st.needs_sync(&sh, dep1);
        assert!(sync.sy);
        st.schedule(&sh, dep1, sync, 0);
        // The sy wait drained everything outstanding.
        assert_eq!(st.needs_sync(&sh, dep2), SyncFlags::default());
    }

    #[test]
    fn war_hazard_forces_ss() {
        let mut sh = shader();
        let mut st = LegalizeState::new(sh.gpu.merged_regs);
        // rcp reads r0 late; overwriting r0 needs (ss).
        let rcp = {
            let inst = sh.create_instr(Opcode::Rcp, 1, 1);
            let d = sh.make_dst(inst, RegFlags::new());
            sh.regs[d].num = 4;
            sh.make_src_num(inst, 0, RegFlags::new());
            inst
        };
        let overwrite = alu(&mut sh, Opcode::AddF, 0, &[8]);
        st.schedule(&sh, rcp, SyncFlags::default(), 0);
        let sync = st.needs_sync(&sh, overwrite);
        assert!(sync.ss);
        assert!(!sync.sy);
    }

    #[test]
    fn merge_takes_worst_case() {
        let mut sh = shader();
        let mut a = LegalizeState::new(sh.gpu.merged_regs);
        let mut b = LegalizeState::new(sh.gpu.merged_regs);
        let s = sam(&mut sh, 4, 0);
        b.schedule(&sh, s, SyncFlags::default(), 2);
        a.merge(&b);
        let dep = alu(&mut sh, Opcode::AddF, 8, &[4]);
        assert!(a.needs_sync(&sh, dep).sy);
        assert_eq!(a.cycle, b.cycle);
    }

    #[test]
    fn predicate_write_delays_branch() {
        let mut sh = shader();
        let mut st = LegalizeState::new(sh.gpu.merged_regs);
        let cmp = {
            let inst = sh.create_instr(Opcode::CmpsS, 1, 2);
            sh.insts[inst].payload = OpPayload::Cmp {
                cond: crate::ir::CondCode::Lt,
            };
            let d = sh.make_dst(inst, RegFlags::PREDICATE);
            sh.regs[d].num = 0;
            sh.make_src_num(inst, 0, RegFlags::new());
            sh.make_src_num(inst, 4, RegFlags::new());
            inst
        };
        let br = {
            let inst = sh.create_instr(Opcode::Br, 0, 1);
            sh.insts[inst].payload = OpPayload::Branch { target: None.into() };
            sh.make_src_num(inst, 0, RegFlags::PREDICATE);
            inst
        };
        st.schedule(&sh, cmp, SyncFlags::default(), 0);
        assert_eq!(st.delay(&sh, br), 6);
    }
}
