//! Tablespace identifier type.

use std::fmt;

/// Identifies a tablespace (one `<name>.ibd` file).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpaceId(pub u32);

impl SpaceId {
    /// Reserved id for the system tablespace (holds the trx/undo bookkeeping).
    pub const SYSTEM: SpaceId = SpaceId(0);

    #[inline]
    pub fn new(id: u32) -> Self {
        SpaceId(id)
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Space({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_id_display() {
        assert_eq!(format!("{}", SpaceId::new(3)), "Space(3)");
        assert_eq!(format!("{}", SpaceId::SYSTEM), "Space(0)");
    }

    #[test]
    fn test_space_id_ordering() {
        assert!(SpaceId::new(1) < SpaceId::new(2));
    }
}
