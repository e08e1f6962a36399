//! Invoice store
//!
//! Write-once invoices keyed by (content hash prefix, tx hash). The prefix is
//! a truncated hash, so distinct invoices may share a bucket; duplicate
//! detection therefore compares full content across the whole bucket.

use crate::{
    config::StoreConfig,
    error::{Error, Result},
    memory::MemoryInvoiceTable,
    rocks::RocksInvoiceTable,
    table::{InvoiceRecord, InvoiceTable, Page},
};
use futures::{Stream, TryStreamExt};
use history_model::{HashPrefix, Invoice, TxHash};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Invoice store over a pluggable table
#[derive(Clone)]
pub struct InvoiceStore {
    table: Arc<dyn InvoiceTable>,
    page_size: usize,
}

impl std::fmt::Debug for InvoiceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvoiceStore")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl InvoiceStore {
    /// Create store over a table
    pub fn new(table: Arc<dyn InvoiceTable>, page_size: usize) -> Self {
        Self {
            table,
            page_size: page_size.max(1),
        }
    }

    /// Open a RocksDB-backed store
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let table = RocksInvoiceTable::open(config)?;
        Ok(Self::new(Arc::new(table), config.page_size))
    }

    /// In-memory store
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryInvoiceTable::new()),
            StoreConfig::default().page_size,
        )
    }

    /// Attach an invoice to a transaction
    ///
    /// Fails with `AlreadyExists` if anything is stored under the same
    /// (prefix, tx hash), even identical content.
    pub async fn add(&self, invoice: &Invoice, tx_hash: &[u8]) -> Result<()> {
        let tx_hash = TxHash::try_from(tx_hash)?;
        let prefix = invoice.hash_prefix()?;
        let contents = invoice.canonical_bytes()?;

        let record = InvoiceRecord {
            prefix,
            tx_hash,
            contents,
        };

        match self.table.put_if_absent(record).await {
            Ok(()) => {
                tracing::debug!(%prefix, %tx_hash, "Invoice stored");
                Ok(())
            }
            Err(Error::AlreadyExists) => Err(Error::AlreadyExists),
            Err(e) => Err(with_context(e, "add", &prefix, &tx_hash)),
        }
    }

    /// Invoice stored under (prefix, tx hash)
    pub async fn get(&self, prefix: &[u8], tx_hash: &[u8]) -> Result<Invoice> {
        let prefix = HashPrefix::try_from(prefix)?;
        let tx_hash = TxHash::try_from(tx_hash)?;

        let contents = self
            .table
            .get(&prefix, &tx_hash)
            .await
            .map_err(|e| with_context(e, "get", &prefix, &tx_hash))?
            .ok_or(Error::NotFound)?;

        Ok(Invoice::from_bytes(&contents)?)
    }

    /// Invoice attached to a transaction, whatever its prefix
    pub async fn get_by_tx_hash(&self, tx_hash: &[u8]) -> Result<Invoice> {
        let tx_hash = TxHash::try_from(tx_hash)?;

        let record = self
            .table
            .find_by_tx_hash(&tx_hash)
            .await
            .map_err(|e| match e {
                Error::Storage(msg) => {
                    Error::Storage(format!("get_by_tx_hash tx_hash={}: {}", tx_hash, msg))
                }
                other => other,
            })?
            .ok_or(Error::NotFound)?;

        Ok(Invoice::from_bytes(&record.contents)?)
    }

    /// Check that no stored invoice has the same content
    ///
    /// Scans the full prefix bucket, whatever tx hash the records carry.
    /// The token is checked between pages.
    pub async fn does_not_exist(&self, invoice: &Invoice, cancel: &CancellationToken) -> Result<()> {
        let prefix = invoice.hash_prefix()?;
        let mut pages = Box::pin(self.pages(prefix, None));

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let page = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                page = pages.try_next() => page?,
            };

            let Some(page) = page else {
                return Ok(());
            };

            for record in &page.records {
                if Invoice::from_bytes(&record.contents)? == *invoice {
                    tracing::debug!(%prefix, tx_hash = %record.tx_hash, "Duplicate invoice content");
                    return Err(Error::AlreadyExists);
                }
            }
        }
    }

    /// Lazy stream of the pages of a prefix bucket
    ///
    /// Restart from any continuation token by passing it as `start_after`.
    pub fn pages(
        &self,
        prefix: HashPrefix,
        start_after: Option<TxHash>,
    ) -> impl Stream<Item = Result<Page>> + Send + 'static {
        let table = Arc::clone(&self.table);
        let limit = self.page_size;

        futures::stream::try_unfold(Some(start_after), move |state| {
            let table = Arc::clone(&table);
            async move {
                let Some(start) = state else {
                    return Ok(None);
                };

                let page = table.query(&prefix, start, limit).await.map_err(|e| match e {
                    Error::Storage(msg) => {
                        Error::Storage(format!("query prefix={}: {}", prefix, msg))
                    }
                    other => other,
                })?;

                let next = page.last_evaluated.map(Some);
                Ok::<_, Error>(Some((page, next)))
            }
        })
    }
}

fn with_context(err: Error, op: &str, prefix: &HashPrefix, tx_hash: &TxHash) -> Error {
    match err {
        Error::Storage(msg) => Error::Storage(format!(
            "{} prefix={} tx_hash={}: {}",
            op, prefix, tx_hash, msg
        )),
        other => other,
    }
}
