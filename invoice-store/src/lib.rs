//! Invoice store
//!
//! Content-addressed, write-once storage for invoices attached to ledger
//! transactions.
//!
//! # Layout
//!
//! - [`InvoiceStore`]: key validation, conditional add, duplicate scan
//! - [`InvoiceTable`]: key-value backend (RocksDB or in-memory)
//!
//! # Guarantees
//!
//! - (prefix, tx hash) is written at most once
//! - Of any number of racing adds on one key exactly one succeeds
//! - Duplicate detection compares full content, never just the prefix

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod error;
pub mod memory;
pub mod rocks;
pub mod store;
pub mod table;

// Re-exports
pub use config::{RocksDBConfig, StoreConfig};
pub use error::{Error, Result};
pub use memory::MemoryInvoiceTable;
pub use rocks::RocksInvoiceTable;
pub use store::InvoiceStore;
pub use table::{InvoiceRecord, InvoiceTable, Page};
