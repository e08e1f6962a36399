//! Ledger pointer codec
//!
//! A pointer is the opaque position an ingester persists so it can resume.
//!
//! # Layout
//!
//! ```text
//! ┌─────────┬───────────────────────────┐
//! │ version │ ledger sequence (u64 BE)  │
//! │ 1 byte  │ 8 bytes                   │
//! └─────────┴───────────────────────────┘
//! ```
//!
//! The cursor derived from a pointer follows the ledger API paging-token
//! convention: `sequence << 32 | intra-ledger order`.

use crate::{
    error::{Error, Result},
    version::KinVersion,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Encoded pointer length
pub const POINTER_LEN: usize = 9;

/// Opaque ingestion position
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pointer(#[serde(with = "serde_bytes")] Vec<u8>);

impl Pointer {
    /// Wrap raw bytes (validated lazily on decode)
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

/// Build a pointer for a ledger sequence
pub fn pointer_from_sequence(version: KinVersion, sequence: u64) -> Pointer {
    let mut p = Vec::with_capacity(POINTER_LEN);
    p.push(version.tag());
    p.extend_from_slice(&sequence.to_be_bytes());
    Pointer(p)
}

/// Protocol version a pointer was built for
pub fn version_from_pointer(pointer: &Pointer) -> Result<KinVersion> {
    let bytes = pointer.as_bytes();
    if bytes.len() != POINTER_LEN {
        return Err(Error::InvalidPointer(format!(
            "expected {} bytes, got {}",
            POINTER_LEN,
            bytes.len()
        )));
    }

    KinVersion::from_tag(bytes[0])
        .ok_or_else(|| Error::InvalidPointer(format!("unknown version tag {}", bytes[0])))
}

/// Ledger sequence a pointer was built from
pub fn sequence_from_pointer(pointer: &Pointer) -> Result<u64> {
    version_from_pointer(pointer)?;

    let mut seq = [0u8; 8];
    seq.copy_from_slice(&pointer.as_bytes()[1..]);
    Ok(u64::from_be_bytes(seq))
}

/// Paging token for the first transaction of the pointer's ledger
pub fn cursor_from_pointer(pointer: &Pointer) -> Result<String> {
    let sequence = sequence_from_pointer(pointer)?;
    Ok(paging_token(sequence, 0)?.to_string())
}

/// `sequence * 2^32 + order`, rejecting sequences outside the token domain
pub fn paging_token(sequence: u64, order: u32) -> Result<u64> {
    let sequence = u32::try_from(sequence).map_err(|_| {
        Error::InvalidPointer(format!("sequence {} exceeds paging token range", sequence))
    })?;

    Ok((u64::from(sequence) << 32) | u64::from(order))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for v in KinVersion::ALL {
            let p = pointer_from_sequence(v, 10);
            assert_eq!(p.as_bytes().len(), POINTER_LEN);
            assert_eq!(sequence_from_pointer(&p).unwrap(), 10);
            assert_eq!(version_from_pointer(&p).unwrap(), v);
        }
    }

    #[test]
    fn test_cursor() {
        for v in KinVersion::ALL {
            let p = pointer_from_sequence(v, 10);
            assert_eq!(cursor_from_pointer(&p).unwrap(), "42949672960");
        }
    }

    #[test]
    fn test_versions_are_disjoint() {
        let p2 = pointer_from_sequence(KinVersion::Kin2, 7);
        let p3 = pointer_from_sequence(KinVersion::Kin3, 7);
        assert_ne!(p2, p3);
    }

    #[test]
    fn test_invalid_pointer() {
        let short = Pointer::from_bytes(vec![3u8; 4]);
        assert!(matches!(
            sequence_from_pointer(&short),
            Err(Error::InvalidPointer(_))
        ));

        let mut bytes = pointer_from_sequence(KinVersion::Kin3, 1).as_bytes().to_vec();
        bytes[0] = 9;
        assert!(matches!(
            sequence_from_pointer(&Pointer::from_bytes(bytes)),
            Err(Error::InvalidPointer(_))
        ));
    }

    #[test]
    fn test_cursor_out_of_range() {
        let p = pointer_from_sequence(KinVersion::Kin2, u64::from(u32::MAX) + 1);
        assert_eq!(sequence_from_pointer(&p).unwrap(), u64::from(u32::MAX) + 1);
        assert!(cursor_from_pointer(&p).is_err());
    }

    #[test]
    fn test_display_is_hex() {
        let p = pointer_from_sequence(KinVersion::Kin3, 0x0102);
        assert_eq!(p.to_string(), "030000000000000102");
    }

    #[test]
    fn test_paging_token_order() {
        assert_eq!(paging_token(1, 0).unwrap(), 1 << 32);
        assert_eq!(paging_token(1, 4096).unwrap(), (1 << 32) + 4096);
    }
}
