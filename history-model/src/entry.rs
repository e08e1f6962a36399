//! History entries
//!
//! An [`Entry`] is one ledger transaction as produced by an ingester. The
//! backend-specific payload lives in [`EntryKind`], a closed sum type: adding
//! a backend is a compile-time checked change, and callers only go through
//! the capabilities on [`Entry`].

use crate::{
    error::{Error, Result},
    memo::KinMemo,
    stellar,
    version::KinVersion,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Ordering key length
pub const ORDERING_KEY_LEN: usize = 9;

/// One ledger transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Protocol version the entry was ingested under
    pub version: KinVersion,

    /// Backend-specific payload
    pub kind: EntryKind,
}

/// Ledger backend variants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Stellar-based ledger
    Stellar(StellarEntry),
}

/// Stellar transaction as recorded in a ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StellarEntry {
    /// Ledger sequence
    pub ledger: u64,

    /// Paging token (`ledger << 32 | order`)
    pub paging_token: u64,

    /// Network passphrase the transaction was hashed under
    pub network_passphrase: String,

    /// Binary transaction envelope
    #[serde(with = "serde_bytes")]
    pub envelope_xdr: Vec<u8>,

    /// Binary transaction result
    #[serde(with = "serde_bytes")]
    pub result_xdr: Vec<u8>,
}

impl Entry {
    /// Type tag used when entries travel through a task queue
    pub const TYPE_NAME: &'static str = "history.v1.Entry";

    /// Create a Stellar entry
    pub fn stellar(version: KinVersion, entry: StellarEntry) -> Self {
        Self {
            version,
            kind: EntryKind::Stellar(entry),
        }
    }

    /// Serialize for transport
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from transport
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Network-scoped transaction hash
    pub fn tx_hash(&self) -> Result<[u8; 32]> {
        match &self.kind {
            EntryKind::Stellar(s) => s.tx_hash(),
        }
    }

    /// Every account the transaction touches
    pub fn accounts(&self) -> Result<BTreeSet<String>> {
        match &self.kind {
            EntryKind::Stellar(s) => Ok(stellar::envelope_accounts(&s.envelope()?)),
        }
    }

    /// Key that orders entries across versions
    pub fn ordering_key(&self) -> Result<Vec<u8>> {
        let cursor = match &self.kind {
            EntryKind::Stellar(s) => s.paging_token,
        };
        Ok(encode_ordering_key(self.version, cursor))
    }
}

impl StellarEntry {
    /// Decoded envelope
    pub fn envelope(&self) -> Result<stellar_xdr::curr::TransactionEnvelope> {
        stellar::decode_envelope(&self.envelope_xdr)
    }

    /// Network-scoped transaction hash
    pub fn tx_hash(&self) -> Result<[u8; 32]> {
        stellar::hash_transaction(&self.envelope()?, &self.network_passphrase)
    }

    /// Kin memo of the transaction, if it carries a valid one
    pub fn kin_memo(&self) -> Result<Option<KinMemo>> {
        let envelope = self.envelope()?;
        Ok(KinMemo::from_xdr(stellar::envelope_memo(&envelope), true))
    }
}

/// Ordering key for a decimal paging-token cursor
pub fn ordering_key_from_cursor(version: KinVersion, cursor: &str) -> Result<Vec<u8>> {
    let c: u64 = cursor
        .parse()
        .map_err(|e| Error::InvalidCursor(format!("{}: {}", cursor, e)))?;
    Ok(encode_ordering_key(version, c))
}

fn encode_ordering_key(version: KinVersion, cursor: u64) -> Vec<u8> {
    let mut k = Vec::with_capacity(ORDERING_KEY_LEN);
    k.push(version.tag());
    k.extend_from_slice(&cursor.to_be_bytes());
    k
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_key_from_cursor() {
        let k = ordering_key_from_cursor(KinVersion::Kin3, "42949672960").unwrap();
        assert_eq!(k.len(), ORDERING_KEY_LEN);
        assert_eq!(k[0], 3);
        assert_eq!(&k[1..], &(10u64 << 32).to_be_bytes());

        assert!(matches!(
            ordering_key_from_cursor(KinVersion::Kin3, "not-a-number"),
            Err(Error::InvalidCursor(_))
        ));
    }

    #[test]
    fn test_ordering_keys_do_not_collide() {
        let k2 = ordering_key_from_cursor(KinVersion::Kin2, "100").unwrap();
        let k3 = ordering_key_from_cursor(KinVersion::Kin3, "100").unwrap();
        assert_ne!(k2, k3);
    }

    #[test]
    fn test_ordering_keys_sort_by_cursor() {
        let earlier = ordering_key_from_cursor(KinVersion::Kin2, "4294967296").unwrap();
        let later = ordering_key_from_cursor(KinVersion::Kin2, "8589934592").unwrap();
        assert!(earlier < later);
    }

    #[test]
    fn test_malformed_bytes() {
        assert!(matches!(
            Entry::from_bytes(&[0xff, 0x01]),
            Err(Error::Malformed(_))
        ));
    }
}
