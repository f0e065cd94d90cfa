//! Condition codes for compare instructions.
//!
//! A condition code here is an enumerated type that determines how a cat2
//! compare (`cmps`/`cmpv`) relates its two operands. The same set of codes
//! is used for float, signed and unsigned flavors; the opcode carries the
//! numeric interpretation.

use core::fmt::{self, Display, Formatter};

/// Condition code for `cmps.*` and `cmpv.*`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum CondCode {
    /// `<`.
    Lt,
    /// `<=`.
    Le,
    /// `>`.
    Gt,
    /// `>=`.
    Ge,
    /// `==`.
    Eq,
    /// `!=`.
    Ne,
}

impl CondCode {
    /// Get the complemented condition code of `self`.
    ///
    /// The complemented condition code produces the opposite result for all
    /// comparisons: `cmp CC, x, y` is true if and only if
    /// `cmp CC.complement(), x, y` is false.
    #[must_use]
    pub fn complement(self) -> Self {
        use self::CondCode::*;
        match self {
            Lt => Ge,
            Le => Gt,
            Gt => Le,
            Ge => Lt,
            Eq => Ne,
            Ne => Eq,
        }
    }

    /// Get the swapped-args condition code for `self`.
    ///
    /// `cmp CC, x, y` is the same as `cmp CC.swap_args(), y, x`.
    #[must_use]
    pub fn swap_args(self) -> Self {
        use self::CondCode::*;
        match self {
            Lt => Gt,
            Le => Ge,
            Gt => Lt,
            Ge => Le,
            Eq => Eq,
            Ne => Ne,
        }
    }
}

impl Display for CondCode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        use self::CondCode::*;
        f.write_str(match *self {
            Lt => "lt",
            Le => "le",
            Gt => "gt",
            Ge => "ge",
            Eq => "eq",
            Ne => "ne",
        })
    }
}
