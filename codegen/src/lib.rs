//! Machine-dependent shader IR and code generator core.
//!
//! This crate lowers a machine-independent shader representation into the
//! target GPU's SSA form and runs the middle-end passes over it: copy
//! propagation, common subexpression elimination, dead code elimination,
//! and post-register-allocation scheduling with sync-bit insertion. The
//! translator that produces the IR, the register allocator, and the binary
//! encoder live in sibling crates and consume the data structures defined
//! here.
//!
//! One [`ir::Shader`] owns all of its IR in entity arenas; compiling many
//! shaders in parallel needs no shared mutable state.

#![warn(missing_docs)]

pub mod context;
pub mod cp;
pub mod cse;
pub mod cursor;
pub mod dce;
pub mod dominator_tree;
pub mod flowgraph;
pub mod fx;
pub mod ir;
pub mod isa;
pub mod legalize;
pub mod postsched;
pub mod timing;
pub mod variant;
pub mod verify;
pub mod write;

pub use crate::context::{Compiler, Context, GpuInfo, Options};
pub use crate::variant::ShaderVariant;

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
