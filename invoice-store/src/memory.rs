//! In-memory invoice table
//!
//! Intended for tests and embedding. Both maps sit behind one lock, so the
//! existence check and the insert are a single critical section.

use crate::{
    error::{Error, Result},
    table::{InvoiceRecord, InvoiceTable, Page},
};
use async_trait::async_trait;
use history_model::{HashPrefix, TxHash, TX_HASH_LEN};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

#[derive(Default)]
struct Tables {
    records: BTreeMap<(HashPrefix, TxHash), Vec<u8>>,
    tx_index: BTreeSet<(TxHash, HashPrefix)>,
}

/// BTreeMap-backed invoice table
#[derive(Default)]
pub struct MemoryInvoiceTable {
    tables: RwLock<Tables>,
}

impl std::fmt::Debug for MemoryInvoiceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryInvoiceTable")
            .field("records", &self.len())
            .finish()
    }
}

impl MemoryInvoiceTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.tables.read().records.len()
    }

    /// Returns `true` if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.tables.read().records.is_empty()
    }
}

#[async_trait]
impl InvoiceTable for MemoryInvoiceTable {
    async fn put_if_absent(&self, record: InvoiceRecord) -> Result<()> {
        let mut tables = self.tables.write();

        let key = (record.prefix, record.tx_hash);
        if tables.records.contains_key(&key) {
            return Err(Error::AlreadyExists);
        }

        tables.records.insert(key, record.contents);
        tables.tx_index.insert((record.tx_hash, record.prefix));
        Ok(())
    }

    async fn get(&self, prefix: &HashPrefix, tx_hash: &TxHash) -> Result<Option<Vec<u8>>> {
        Ok(self.tables.read().records.get(&(*prefix, *tx_hash)).cloned())
    }

    async fn query(
        &self,
        prefix: &HashPrefix,
        exclusive_start: Option<TxHash>,
        limit: usize,
    ) -> Result<Page> {
        let tables = self.tables.read();

        let lower = match exclusive_start {
            Some(start) => Bound::Excluded((*prefix, start)),
            None => Bound::Included((*prefix, TxHash([0u8; TX_HASH_LEN]))),
        };

        let records: Vec<InvoiceRecord> = tables
            .records
            .range((lower, Bound::Unbounded))
            .take_while(|((p, _), _)| p == prefix)
            .take(limit)
            .map(|((p, t), contents)| InvoiceRecord {
                prefix: *p,
                tx_hash: *t,
                contents: contents.clone(),
            })
            .collect();

        let last_evaluated = if records.len() == limit {
            records.last().map(|r| r.tx_hash)
        } else {
            None
        };

        Ok(Page {
            records,
            last_evaluated,
        })
    }

    async fn find_by_tx_hash(&self, tx_hash: &TxHash) -> Result<Option<InvoiceRecord>> {
        let tables = self.tables.read();

        let found = tables
            .tx_index
            .range((*tx_hash, HashPrefix([0u8; history_model::HASH_PREFIX_LEN]))..)
            .next()
            .filter(|(t, _)| t == tx_hash);

        Ok(found.and_then(|(t, p)| {
            tables.records.get(&(*p, *t)).map(|contents| InvoiceRecord {
                prefix: *p,
                tx_hash: *t,
                contents: contents.clone(),
            })
        }))
    }
}
