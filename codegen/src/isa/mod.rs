//! Hardware tables.
//!
//! Latency tables, delay-slot counts, and operand-encoding constraints are
//! data, not logic. This module is their single source of truth: everything
//! is exposed as pure functions of opcodes and operand positions, so the
//! copy-propagation pass and the schedulers can be tested against the
//! tables independently.

pub mod constraints;
pub mod delays;

pub use self::constraints::valid_flags;
pub use self::delays::{
    instr_latency, required_delay, soft_required_delay, soft_ss_delay, soft_sy_delay,
};
