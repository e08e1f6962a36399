//! Protocol versions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger backend generation an entry or pointer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum KinVersion {
    /// Kin 2 (Stellar-based, 7 decimal asset)
    Kin2 = 2,
    /// Kin 3 (Stellar-based, native asset)
    Kin3 = 3,
}

impl KinVersion {
    /// All versions understood by this crate
    pub const ALL: [KinVersion; 2] = [KinVersion::Kin2, KinVersion::Kin3];

    /// Wire tag
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Parse from wire tag
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            2 => Some(KinVersion::Kin2),
            3 => Some(KinVersion::Kin3),
            _ => None,
        }
    }
}

impl fmt::Display for KinVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kin{}", self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_round_trip() {
        for v in KinVersion::ALL {
            assert_eq!(KinVersion::from_tag(v.tag()), Some(v));
        }
        assert_eq!(KinVersion::from_tag(0), None);
        assert_eq!(KinVersion::from_tag(4), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(KinVersion::Kin3.to_string(), "kin3");
    }
}
