//! Invoices and their storage identity
//!
//! An invoice is bound to exactly one transaction. Its storage identity is
//! derived from content: the first 29 bytes of the SHA-256 of the canonical
//! encoding, paired with the 32 byte transaction hash.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hash prefix length
pub const HASH_PREFIX_LEN: usize = 29;

/// Transaction hash length
pub const TX_HASH_LEN: usize = 32;

/// Single billed item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineItem {
    /// Short title
    pub title: String,

    /// Free form description
    pub description: String,

    /// Amount in quarks
    pub amount: i64,

    /// App-defined stock keeping unit
    #[serde(default, with = "serde_bytes")]
    pub sku: Option<Vec<u8>>,
}

/// Billing content attached to a transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Invoice {
    /// Line items, in order
    pub items: Vec<LineItem>,
}

impl Invoice {
    /// Create invoice from items
    pub fn new(items: Vec<LineItem>) -> Self {
        Self { items }
    }

    /// Canonical bytes (what the hash prefix is computed over)
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode canonical bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Storage partition key for this content
    pub fn hash_prefix(&self) -> Result<HashPrefix> {
        let digest = Sha256::digest(self.canonical_bytes()?);
        let mut prefix = [0u8; HASH_PREFIX_LEN];
        prefix.copy_from_slice(&digest[..HASH_PREFIX_LEN]);
        Ok(HashPrefix(prefix))
    }
}

/// Truncated content hash (collisions across distinct content are possible)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashPrefix(pub [u8; HASH_PREFIX_LEN]);

impl HashPrefix {
    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for HashPrefix {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let prefix: [u8; HASH_PREFIX_LEN] = bytes.try_into().map_err(|_| {
            Error::InvalidArgument(format!("invalid invoice hash prefix len: {}", bytes.len()))
        })?;
        Ok(Self(prefix))
    }
}

impl fmt::Display for HashPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Network-scoped transaction hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxHash(pub [u8; TX_HASH_LEN]);

impl TxHash {
    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for TxHash {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let hash: [u8; TX_HASH_LEN] = bytes.try_into().map_err(|_| {
            Error::InvalidArgument(format!("invalid transaction hash len: {}", bytes.len()))
        })?;
        Ok(Self(hash))
    }
}

impl From<[u8; TX_HASH_LEN]> for TxHash {
    fn from(hash: [u8; TX_HASH_LEN]) -> Self {
        Self(hash)
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
