//! Instruction data.
//!
//! An instruction is an opcode plus ordered destination and source operand
//! lists, instruction-level flags, and a category-specific payload. All
//! operands are `Reg` entities owned by the shader; the lists here hold
//! references only.

use crate::ir::condcodes::CondCode;
use crate::ir::entities::{Block, Inst, Reg};
use crate::ir::types::{NumType, RoundMode};
use crate::ir::Opcode;
use basalt_entity::PackedOption;
use core::fmt;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

/// Instruction-level flag bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InstrFlags {
    bits: u16,
}

impl InstrFlags {
    /// Wait for outstanding SFU/local-memory results before issue.
    pub const SS: Self = Self { bits: 1 << 0 };
    /// Wait for outstanding texture/global-memory results before issue.
    pub const SY: Self = Self { bits: 1 << 1 };
    /// This instruction is a jump target.
    pub const JP: Self = Self { bits: 1 << 2 };
    /// Clamp the float result to [0, 1].
    pub const SAT: Self = Self { bits: 1 << 3 };
    /// Resource index comes from a bindless descriptor.
    pub const BINDLESS: Self = Self { bits: 1 << 4 };
    /// Resource index may diverge across fibers.
    pub const NONUNIFORM: Self = Self { bits: 1 << 5 };
    /// Executes in helper invocations.
    pub const USES_HELPERS: Self = Self { bits: 1 << 6 };
    /// Requires helper invocations to stay alive.
    pub const NEEDS_HELPERS: Self = Self { bits: 1 << 7 };
    /// Transient pass-local marker; meaningless between passes.
    pub const MARK: Self = Self { bits: 1 << 8 };
    /// Invert the branch/kill condition.
    pub const INV_COND: Self = Self { bits: 1 << 9 };
    /// Cat6: 64-bit global addressing.
    pub const GLOBAL: Self = Self { bits: 1 << 10 };
    /// Cat5: 3D texture access.
    pub const TEX_3D: Self = Self { bits: 1 << 11 };
    /// Cat5: array texture access.
    pub const TEX_ARRAY: Self = Self { bits: 1 << 12 };

    /// Empty flag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Are all bits of `other` set?
    pub fn contains(self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }

    /// Is any bit of `other` set?
    pub fn intersects(self, other: Self) -> bool {
        self.bits & other.bits != 0
    }

    /// Set all bits of `other`.
    pub fn insert(&mut self, other: Self) {
        self.bits |= other.bits;
    }

    /// Clear all bits of `other`.
    pub fn remove(&mut self, other: Self) {
        self.bits &= !other.bits;
    }

    /// The raw bit pattern, for hashing and compact storage.
    pub fn bits(self) -> u16 {
        self.bits
    }
}

impl core::ops::BitOr for InstrFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self {
            bits: self.bits | rhs.bits,
        }
    }
}

impl fmt::Debug for InstrFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        static NAMES: [(InstrFlags, &str); 13] = [
            (InstrFlags::SS, "ss"),
            (InstrFlags::SY, "sy"),
            (InstrFlags::JP, "jp"),
            (InstrFlags::SAT, "sat"),
            (InstrFlags::BINDLESS, "bindless"),
            (InstrFlags::NONUNIFORM, "nonuniform"),
            (InstrFlags::USES_HELPERS, "uses_helpers"),
            (InstrFlags::NEEDS_HELPERS, "needs_helpers"),
            (InstrFlags::MARK, "mark"),
            (InstrFlags::INV_COND, "inv"),
            (InstrFlags::GLOBAL, "g"),
            (InstrFlags::TEX_3D, "3d"),
            (InstrFlags::TEX_ARRAY, "a"),
        ];
        let mut first = true;
        for (bit, name) in NAMES {
            if self.contains(bit) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("(none)")?;
        }
        Ok(())
    }
}

/// Memory side-effect classes, used to refuse reordering across barriers
/// and kills. One read and one write bit per storage class.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
pub struct BarrierMask {
    bits: u16,
}

impl BarrierMask {
    /// Fiber-shared scratch reads.
    pub const SHARED_R: Self = Self { bits: 1 << 0 };
    /// Fiber-shared scratch writes.
    pub const SHARED_W: Self = Self { bits: 1 << 1 };
    /// Image reads.
    pub const IMAGE_R: Self = Self { bits: 1 << 2 };
    /// Image writes.
    pub const IMAGE_W: Self = Self { bits: 1 << 3 };
    /// Storage-buffer reads.
    pub const BUFFER_R: Self = Self { bits: 1 << 4 };
    /// Storage-buffer writes.
    pub const BUFFER_W: Self = Self { bits: 1 << 5 };
    /// Register-array reads.
    pub const ARRAY_R: Self = Self { bits: 1 << 6 };
    /// Register-array writes.
    pub const ARRAY_W: Self = Self { bits: 1 << 7 };
    /// Private (per-fiber spill) memory reads.
    pub const PRIVATE_R: Self = Self { bits: 1 << 8 };
    /// Private memory writes.
    pub const PRIVATE_W: Self = Self { bits: 1 << 9 };
    /// Constant-file reads.
    pub const CONST_R: Self = Self { bits: 1 << 10 };
    /// Constant-file writes (preamble only).
    pub const CONST_W: Self = Self { bits: 1 << 11 };
    /// Reads of the active-fiber set.
    pub const ACTIVE_FIBERS_R: Self = Self { bits: 1 << 12 };
    /// Writes of the active-fiber set (kill, demote).
    pub const ACTIVE_FIBERS_W: Self = Self { bits: 1 << 13 };

    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Is any bit of `other` set?
    pub fn intersects(self, other: Self) -> bool {
        self.bits & other.bits != 0
    }

    /// Set all bits of `other`.
    pub fn insert(&mut self, other: Self) {
        self.bits |= other.bits;
    }

    /// No bits set?
    pub fn is_empty(self) -> bool {
        self.bits == 0
    }
}

impl core::ops::BitOr for BarrierMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self {
            bits: self.bits | rhs.bits,
        }
    }
}

/// Texture access descriptor for cat5.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct TexInfo {
    /// Texture index (or bindless descriptor slot).
    pub tex: u16,
    /// Sampler index.
    pub samp: u16,
    /// Result type.
    pub typ: Option<NumType>,
}

/// Memory access descriptor for cat6.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemInfo {
    /// Access type.
    pub typ: NumType,
    /// Byte offset applied to the destination address.
    pub dst_offset: i32,
    /// Byte offset applied to the source address.
    pub src_offset: i32,
}

/// Category-specific instruction payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum OpPayload {
    /// No extra data.
    #[default]
    None,
    /// Cat0 branch: the taken target. The fall-through target is the
    /// block's other successor.
    Branch {
        /// Taken target block.
        target: PackedOption<Block>,
    },
    /// Cat1 move/conversion.
    Mov {
        /// Type the source bits are read as.
        src_type: NumType,
        /// Type the destination is written as.
        dst_type: NumType,
        /// Conversion rounding mode.
        round: RoundMode,
    },
    /// Cat2 compare.
    Cmp {
        /// Compare condition.
        cond: CondCode,
    },
    /// Cat3 state.
    Cat3 {
        /// Set once the operand-swap rewrite has run, so it is not retried.
        swapped: bool,
    },
    /// Cat5 texture access.
    Tex(TexInfo),
    /// Cat6 memory access.
    Mem(MemInfo),
    /// Meta phi: block of origin for each source, in source order.
    Phi {
        /// `blocks[i]` is the predecessor contributing source `i`.
        blocks: SmallVec<[Block; 2]>,
    },
    /// Meta split: which component of the source vector to extract.
    Split {
        /// Component index.
        component: u16,
    },
    /// Meta input marker.
    Input {
        /// Driver-assigned input slot.
        sysval: u16,
    },
    /// Meta texture prefetch.
    TexPrefetch {
        /// Texture index.
        tex: u16,
        /// Sampler index.
        samp: u16,
    },
}

/// The data stored for each instruction.
#[derive(Clone, Debug)]
pub struct InstData {
    /// Operation.
    pub opcode: Opcode,
    /// Instruction-level modifiers, including the sync bits the post-RA
    /// scheduler assigns.
    pub flags: InstrFlags,
    /// Destination operands. At most one for everything but meta splits.
    pub dsts: SmallVec<[Reg; 1]>,
    /// Source operands.
    pub srcs: SmallVec<[Reg; 3]>,
    /// Category-specific payload.
    pub payload: OpPayload,
    /// Repeat count: the instruction issues `repeat + 1` times with
    /// stride-1 operand bumping. 0..3.
    pub repeat: u8,
    /// Embedded nop count before issue. 0..5.
    pub nop: u8,
    /// Instruction pointer assigned by `Shader::number_instructions`.
    pub ip: u32,
    /// Creation serial number; strictly increasing, used for deterministic
    /// tie-breaking and repeat-group ordering.
    pub serial: u32,
    /// SSA reference to the `a0`/`a1` definition this instruction depends
    /// on, when any operand is relative-addressed.
    pub address: PackedOption<Reg>,
    /// Next instruction of the repeat group, if grouped.
    pub rpt_next: PackedOption<Inst>,
    /// Ordering-only dependencies that are not value flow (array aliasing,
    /// barrier and kill ordering).
    pub deps: SmallVec<[Inst; 2]>,
    /// Side-effect classes this instruction belongs to.
    pub barrier_class: BarrierMask,
    /// Side-effect classes this instruction must not be reordered across.
    pub barrier_conflict: BarrierMask,
    /// Number of SSA sources referencing this instruction's destinations.
    pub use_count: u32,
    /// The referencing instructions; only valid after
    /// `Shader::find_ssa_uses`.
    pub uses: FxHashSet<Inst>,
}

impl InstData {
    /// A fresh, unlinked instruction with the given opcode.
    pub fn new(opcode: Opcode, serial: u32) -> Self {
        Self {
            opcode,
            flags: InstrFlags::new(),
            dsts: SmallVec::new(),
            srcs: SmallVec::new(),
            payload: OpPayload::None,
            repeat: 0,
            nop: 0,
            ip: 0,
            serial,
            address: None.into(),
            rpt_next: None.into(),
            deps: SmallVec::new(),
            barrier_class: BarrierMask::new(),
            barrier_conflict: BarrierMask::new(),
            use_count: 0,
            uses: FxHashSet::default(),
        }
    }

    /// The single destination, for the common one-destination case.
    pub fn dst(&self) -> Reg {
        debug_assert_eq!(self.dsts.len(), 1);
        self.dsts[0]
    }

    /// Is this a cat1 mov whose source and destination types are equal?
    pub fn is_same_type_mov(&self) -> bool {
        self.opcode == Opcode::Mov
            && matches!(
                self.payload,
                OpPayload::Mov {
                    src_type,
                    dst_type,
                    ..
                } if src_type == dst_type
            )
    }

    /// The branch target, for cat0 branches.
    pub fn branch_target(&self) -> Option<Block> {
        match self.payload {
            OpPayload::Branch { target } => target.expand(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instr_flags() {
        let mut f = InstrFlags::new();
        f.insert(InstrFlags::SS | InstrFlags::JP);
        assert!(f.contains(InstrFlags::SS));
        assert!(!f.contains(InstrFlags::SY));
        f.remove(InstrFlags::SS);
        assert!(!f.intersects(InstrFlags::SS));
        assert!(f.contains(InstrFlags::JP));
    }

    #[test]
    fn barrier_masks() {
        let cls = BarrierMask::SHARED_W | BarrierMask::ACTIVE_FIBERS_R;
        assert!(cls.intersects(BarrierMask::SHARED_W));
        assert!(!cls.intersects(BarrierMask::SHARED_R));
    }

    #[test]
    fn same_type_mov() {
        use crate::ir::types::{NumType, RoundMode};
        let mut i = InstData::new(Opcode::Mov, 0);
        i.payload = OpPayload::Mov {
            src_type: NumType::F32,
            dst_type: NumType::F32,
            round: RoundMode::Zero,
        };
        assert!(i.is_same_type_mov());
        i.payload = OpPayload::Mov {
            src_type: NumType::F16,
            dst_type: NumType::F32,
            round: RoundMode::Zero,
        };
        assert!(!i.is_same_type_mov());
    }
}
