//! Invoice table on RocksDB
//!
//! # Column Families
//!
//! - `invoices` - Invoice contents (key: prefix || tx_hash)
//! - `invoice_tx_index` - Reverse index (key: tx_hash || prefix, empty value)
//!
//! Conditional puts run in a pessimistic transaction: the record key is
//! locked with `get_for_update`, so concurrent writers on one key
//! serialize and only the first sees it absent. A writer that times out
//! waiting for the lock retries, then reports `AlreadyExists` if the
//! holder committed the record.

use crate::{
    config::StoreConfig,
    error::{Error, Result},
    table::{index_key, record_key, split_record_key, InvoiceRecord, InvoiceTable, Page},
};
use async_trait::async_trait;
use history_model::{HashPrefix, TxHash, TX_HASH_LEN};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, ErrorKind, IteratorMode, Options,
    TransactionDB, TransactionDBOptions,
};
use std::sync::Arc;
use tracing::debug;

/// Column family names
const CF_INVOICES: &str = "invoices";
const CF_TX_INDEX: &str = "invoice_tx_index";

/// Locked insert attempts before falling back to a plain read
const LOCK_ATTEMPTS: u32 = 3;

/// RocksDB-backed invoice table
#[derive(Clone)]
pub struct RocksInvoiceTable {
    db: Arc<TransactionDB>,
}

impl std::fmt::Debug for RocksInvoiceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksInvoiceTable").finish_non_exhaustive()
    }
}

impl RocksInvoiceTable {
    /// Open or create database
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let mut txn_opts = TransactionDBOptions::default();
        txn_opts.set_txn_lock_timeout(config.lock_timeout_ms);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_INVOICES, Self::cf_options(config)),
            ColumnFamilyDescriptor::new(CF_TX_INDEX, Self::cf_options(config)),
        ];

        let db = TransactionDB::open_cf_descriptors(&db_opts, &txn_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened invoice table");

        Ok(Self { db: Arc::new(db) })
    }

    fn cf_options(config: &StoreConfig) -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Point lookups dominate
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(config.rocksdb.bloom_bits_per_key, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    /// Run a blocking closure against the database
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&TransactionDB) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| Error::Storage(format!("storage task failed: {}", e)))?
    }
}

fn cf_handle<'a>(db: &'a TransactionDB, name: &str) -> Result<&'a ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
}

fn put_if_absent(db: &TransactionDB, record: &InvoiceRecord) -> Result<()> {
    let invoices = cf_handle(db, CF_INVOICES)?;
    let index = cf_handle(db, CF_TX_INDEX)?;

    let key = record_key(&record.prefix, &record.tx_hash);

    let mut contended = None;
    for attempt in 1..=LOCK_ATTEMPTS {
        match insert(db, invoices, index, &key, record) {
            Ok(true) => return Ok(()),
            Ok(false) => return Err(Error::AlreadyExists),
            Err(e) if is_contended(&e) => {
                debug!(attempt, "Invoice row lock contended: {}", e);
                contended = Some(e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    // Lock still held elsewhere; a committed record means this put lost
    if db.get_cf(invoices, &key)?.is_some() {
        return Err(Error::AlreadyExists);
    }

    Err(contended
        .map(Error::from)
        .unwrap_or_else(|| Error::Storage("invoice row lock contended".to_string())))
}

/// One locked insert; `Ok(false)` when the key is taken
fn insert(
    db: &TransactionDB,
    invoices: &ColumnFamily,
    index: &ColumnFamily,
    key: &[u8],
    record: &InvoiceRecord,
) -> std::result::Result<bool, rocksdb::Error> {
    let txn = db.transaction();
    if txn.get_for_update_cf(invoices, key, true)?.is_some() {
        txn.rollback()?;
        return Ok(false);
    }

    txn.put_cf(invoices, key, &record.contents)?;
    txn.put_cf(index, index_key(&record.tx_hash, &record.prefix), b"")?;
    txn.commit()?;

    Ok(true)
}

fn is_contended(err: &rocksdb::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::Busy | ErrorKind::TimedOut | ErrorKind::TryAgain
    )
}

fn query(
    db: &TransactionDB,
    prefix: &HashPrefix,
    exclusive_start: Option<TxHash>,
    limit: usize,
) -> Result<Page> {
    let invoices = cf_handle(db, CF_INVOICES)?;

    let start = record_key(prefix, &exclusive_start.unwrap_or(TxHash([0u8; TX_HASH_LEN])));
    let iter = db.iterator_cf(invoices, IteratorMode::From(&start, Direction::Forward));

    let mut records = Vec::with_capacity(limit.min(64));
    for item in iter {
        let (key, value) = item?;
        if !key.starts_with(prefix.as_bytes()) {
            break;
        }
        if exclusive_start.is_some() && key.as_ref() == start.as_slice() {
            continue;
        }

        let (prefix, tx_hash) = split_record_key(&key)
            .ok_or_else(|| Error::Storage(format!("corrupt invoice key len: {}", key.len())))?;
        records.push(InvoiceRecord {
            prefix,
            tx_hash,
            contents: value.into_vec(),
        });

        if records.len() == limit {
            break;
        }
    }

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

fn find_by_tx_hash(db: &TransactionDB, tx_hash: &TxHash) -> Result<Option<InvoiceRecord>> {
    let index = cf_handle(db, CF_TX_INDEX)?;
    let invoices = cf_handle(db, CF_INVOICES)?;

    let mut iter = db.iterator_cf(index, IteratorMode::From(tx_hash.as_bytes(), Direction::Forward));
    let key = match iter.next() {
        Some(item) => item?.0,
        None => return Ok(None),
    };
    if !key.starts_with(tx_hash.as_bytes()) {
        return Ok(None);
    }

    let prefix = HashPrefix::try_from(&key[TX_HASH_LEN..])?;
    let contents = db
        .get_cf(invoices, record_key(&prefix, tx_hash))?
        .ok_or_else(|| Error::Storage(format!("dangling index entry for {}", tx_hash)))?;

    Ok(Some(InvoiceRecord {
        prefix,
        tx_hash: *tx_hash,
        contents,
    }))
}

#[async_trait]
impl InvoiceTable for RocksInvoiceTable {
    async fn put_if_absent(&self, record: InvoiceRecord) -> Result<()> {
        self.blocking(move |db| put_if_absent(db, &record)).await
    }

    async fn get(&self, prefix: &HashPrefix, tx_hash: &TxHash) -> Result<Option<Vec<u8>>> {
        let key = record_key(prefix, tx_hash);
        self.blocking(move |db| {
            let invoices = cf_handle(db, CF_INVOICES)?;
            Ok(db.get_cf(invoices, key)?)
        })
        .await
    }

    async fn query(
        &self,
        prefix: &HashPrefix,
        exclusive_start: Option<TxHash>,
        limit: usize,
    ) -> Result<Page> {
        let prefix = *prefix;
        self.blocking(move |db| query(db, &prefix, exclusive_start, limit))
            .await
    }

    async fn find_by_tx_hash(&self, tx_hash: &TxHash) -> Result<Option<InvoiceRecord>> {
        let tx_hash = *tx_hash;
        self.blocking(move |db| find_by_tx_hash(db, &tx_hash)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (TempDir, RocksInvoiceTable) {
        open_with_lock_timeout(StoreConfig::default().lock_timeout_ms)
    }

    fn open_with_lock_timeout(lock_timeout_ms: i64) -> (TempDir, RocksInvoiceTable) {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            data_dir: dir.path().to_path_buf(),
            lock_timeout_ms,
            ..Default::default()
        };
        let table = RocksInvoiceTable::open(&config).unwrap();
        (dir, table)
    }

    fn record(prefix: u8, tx: u8) -> InvoiceRecord {
        InvoiceRecord {
            prefix: HashPrefix([prefix; 29]),
            tx_hash: TxHash([tx; 32]),
            contents: vec![prefix, tx],
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (_dir, table) = open();
        table.put_if_absent(record(1, 2)).await.unwrap();

        let got = table
            .get(&HashPrefix([1; 29]), &TxHash([2; 32]))
            .await
            .unwrap();
        assert_eq!(got, Some(vec![1, 2]));

        assert!(matches!(
            table.put_if_absent(record(1, 2)).await,
            Err(Error::AlreadyExists)
        ));
    }

    #[tokio::test]
    async fn test_query_stays_in_partition() {
        let (_dir, table) = open();
        for tx in 0..3u8 {
            table.put_if_absent(record(5, tx)).await.unwrap();
        }
        table.put_if_absent(record(6, 0)).await.unwrap();

        let prefix = HashPrefix([5; 29]);
        let first = table.query(&prefix, None, 2).await.unwrap();
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.last_evaluated, Some(TxHash([1; 32])));

        let rest = table.query(&prefix, first.last_evaluated, 2).await.unwrap();
        assert_eq!(rest.records, vec![record(5, 2)]);
        assert_eq!(rest.last_evaluated, None);
    }

    #[tokio::test]
    async fn test_find_by_tx_hash() {
        let (_dir, table) = open();
        table.put_if_absent(record(4, 8)).await.unwrap();

        assert_eq!(
            table.find_by_tx_hash(&TxHash([8; 32])).await.unwrap(),
            Some(record(4, 8))
        );
        assert_eq!(table.find_by_tx_hash(&TxHash([9; 32])).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reopen_keeps_records() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        {
            let table = RocksInvoiceTable::open(&config).unwrap();
            table.put_if_absent(record(2, 2)).await.unwrap();
        }

        let table = RocksInvoiceTable::open(&config).unwrap();
        assert!(matches!(
            table.put_if_absent(record(2, 2)).await,
            Err(Error::AlreadyExists)
        ));
    }

    #[test]
    fn test_lock_timeout_loser_sees_duplicate() {
        let (_dir, table) = open_with_lock_timeout(100);
        let db = table.db.as_ref();
        let rec = record(3, 3);
        let key = record_key(&rec.prefix, &rec.tx_hash);
        let invoices = cf_handle(db, CF_INVOICES).unwrap();

        // Hold the row lock past one lock timeout, then commit
        let holder = db.transaction();
        assert!(holder.get_for_update_cf(invoices, &key, true).unwrap().is_none());
        holder.put_cf(invoices, &key, &rec.contents).unwrap();

        std::thread::scope(|s| {
            let racer = s.spawn(|| put_if_absent(db, &rec));
            std::thread::sleep(std::time::Duration::from_millis(150));
            holder.commit().unwrap();

            assert!(matches!(racer.join().unwrap(), Err(Error::AlreadyExists)));
        });
    }

    #[test]
    fn test_lock_never_released_is_transient() {
        let (_dir, table) = open_with_lock_timeout(20);
        let db = table.db.as_ref();
        let rec = record(4, 4);
        let key = record_key(&rec.prefix, &rec.tx_hash);
        let invoices = cf_handle(db, CF_INVOICES).unwrap();

        let holder = db.transaction();
        holder.get_for_update_cf(invoices, &key, true).unwrap();

        std::thread::scope(|s| {
            let err = s.spawn(|| put_if_absent(db, &rec)).join().unwrap().unwrap_err();
            assert!(err.is_transient(), "unexpected error: {:?}", err);
        });

        holder.rollback().unwrap();
    }
}
