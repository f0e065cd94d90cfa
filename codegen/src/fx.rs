//! Fast, non-cryptographic hash containers used throughout the crate.

pub use rustc_hash::{FxHashMap, FxHashSet};
