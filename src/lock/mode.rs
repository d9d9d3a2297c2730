//! Lock modes and the compatibility matrix (spec §4.6).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared.
    S,
    /// Exclusive.
    X,
    /// Intention shared.
    IS,
    /// Intention exclusive.
    IX,
    /// Update (upgrade-pending shared).
    U,
}

impl LockMode {
    /// `true` iff a lock already held in `self` mode is compatible with
    /// a new request in `other` mode, per the table in spec §4.6.
    pub fn compatible_with(&self, other: LockMode) -> bool {
        use LockMode::*;
        matches!(
            (self, other),
            (S, S) | (S, IS)
                | (IS, S) | (IS, IS) | (IS, IX) | (IS, U)
                | (IX, IS) | (IX, IX)
                | (U, IS)
        )
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LockMode::S => "S",
            LockMode::X => "X",
            LockMode::IS => "IS",
            LockMode::IX => "IX",
            LockMode::U => "U",
        };
        write!(f, "{s}")
    }
}
