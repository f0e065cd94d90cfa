//! Representation of machine-dependent shader IR.
//!
//! The `ir` module defines the lowered, vendor-specific SSA form: register
//! operands with algebraic modifiers, instructions grouped into hardware
//! categories, basic blocks with machine-level control flow, and the shader
//! aggregate owning all of it.

pub mod builder;
mod condcodes;
pub mod constpool;
mod entities;
mod instr;
mod layout;
mod opcodes;
pub mod reg;
pub mod regmask;
mod shader;
mod types;

pub use self::builder::InsertBuilder;
pub use self::condcodes::CondCode;
pub use self::constpool::{ConstAlloc, ConstPool, ConstPurpose};
pub use self::entities::{ArrayVar, Block, Inst, Reg};
pub use self::instr::{BarrierMask, InstData, InstrFlags, MemInfo, OpPayload, TexInfo};
pub use self::layout::Layout;
pub use self::opcodes::{Category, Opcode};
pub use self::reg::{file_offset, slot_width, RegData, RegFile, RegFlags, INVALID_REG};
pub use self::regmask::RegMask;
pub use self::shader::{ArrayData, BlockData, Shader, ShaderStage};
pub use self::types::{NumType, RoundMode};
