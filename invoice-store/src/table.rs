//! Key-value table contract behind the invoice store
//!
//! Schema: partition key = 29 byte hash prefix, sort key = 32 byte
//! transaction hash, payload = canonical invoice bytes.
//!
//! Implementations must:
//! - make `put_if_absent` the single linearization point per key; of any
//!   number of concurrent puts on one key exactly one succeeds
//! - never modify a record once written
//! - return partition pages in sort-key order, with a continuation token
//!   whenever more records may follow

use crate::error::Result;
use async_trait::async_trait;
use history_model::{HashPrefix, TxHash, HASH_PREFIX_LEN, TX_HASH_LEN};

/// Stored invoice row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRecord {
    /// Partition key
    pub prefix: HashPrefix,

    /// Sort key
    pub tx_hash: TxHash,

    /// Canonical invoice bytes
    pub contents: Vec<u8>,
}

/// One page of a partition query
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Records in sort-key order
    pub records: Vec<InvoiceRecord>,

    /// Continuation token; `None` once the partition is exhausted
    pub last_evaluated: Option<TxHash>,
}

/// Key-value backend for invoices
#[async_trait]
pub trait InvoiceTable: Send + Sync {
    /// Insert the record only if its key is absent
    ///
    /// Returns `Error::AlreadyExists` if a record is already stored under
    /// (prefix, tx hash).
    async fn put_if_absent(&self, record: InvoiceRecord) -> Result<()>;

    /// Point lookup
    async fn get(&self, prefix: &HashPrefix, tx_hash: &TxHash) -> Result<Option<Vec<u8>>>;

    /// Up to `limit` records of a partition, after `exclusive_start`
    async fn query(
        &self,
        prefix: &HashPrefix,
        exclusive_start: Option<TxHash>,
        limit: usize,
    ) -> Result<Page>;

    /// First record attached to a transaction, in prefix order
    async fn find_by_tx_hash(&self, tx_hash: &TxHash) -> Result<Option<InvoiceRecord>>;
}

/// Record key: prefix || tx hash
pub(crate) fn record_key(prefix: &HashPrefix, tx_hash: &TxHash) -> Vec<u8> {
    let mut key = Vec::with_capacity(HASH_PREFIX_LEN + TX_HASH_LEN);
    key.extend_from_slice(prefix.as_bytes());
    key.extend_from_slice(tx_hash.as_bytes());
    key
}

/// Index key: tx hash || prefix
pub(crate) fn index_key(tx_hash: &TxHash, prefix: &HashPrefix) -> Vec<u8> {
    let mut key = Vec::with_capacity(TX_HASH_LEN + HASH_PREFIX_LEN);
    key.extend_from_slice(tx_hash.as_bytes());
    key.extend_from_slice(prefix.as_bytes());
    key
}

/// Split a record key back into (prefix, tx hash)
pub(crate) fn split_record_key(key: &[u8]) -> Option<(HashPrefix, TxHash)> {
    if key.len() != HASH_PREFIX_LEN + TX_HASH_LEN {
        return None;
    }
    let prefix = HashPrefix::try_from(&key[..HASH_PREFIX_LEN]).ok()?;
    let tx_hash = TxHash::try_from(&key[HASH_PREFIX_LEN..]).ok()?;
    Some((prefix, tx_hash))
}
