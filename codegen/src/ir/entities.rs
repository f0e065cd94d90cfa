//! Shader IR entity references.
//!
//! Instructions in the machine IR need to reference other entities in the
//! shader: blocks, other instructions (through their destination operands),
//! and array variables. These references are not Rust references, both
//! because the SSA graph is cyclic and because 64-bit pointers take a lot of
//! space; instead every entity is a struct wrapping a `u32` index into a
//! table owned by the `Shader`. There is a separate index type for each
//! entity type, so we don't lose type safety.
//!
//! The `u32::MAX` index is reserved so that `PackedOption<T>` of any entity
//! stays four bytes.

use basalt_entity::entity_impl;

/// An opaque reference to a basic block in a shader.
///
/// Blocks are created with `Shader::create_block` and laid out by the
/// `Layout`. While the order of block numbers is stable, it is arbitrary and
/// does not necessarily resemble the layout order.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// An opaque reference to an instruction.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// An opaque reference to a register operand.
///
/// A `Reg` names one source or destination slot of one instruction; it is
/// not a physical register. SSA edges are `Reg -> Reg` links from a source
/// operand to the destination operand that defines the value.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(u32);
entity_impl!(Reg, "%");

/// An opaque reference to an array variable: a virtually addressed register
/// vector accessed with relative addressing.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArrayVar(u32);
entity_impl!(ArrayVar, "arr");
