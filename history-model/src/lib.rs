//! Transaction history model
//!
//! Shared data model for the notification backbone: ledger positions,
//! history entries and the invoices bound to them.
//!
//! # Architecture
//!
//! - **Pointer**: opaque, version-tagged ingestion position
//! - **Entry**: one ledger transaction, tagged by ledger backend
//! - **Memo**: Kin binary memo carrying the owning application index
//! - **Invoice**: billing content addressed by a truncated content hash
//!
//! # Invariants
//!
//! - Pointers round-trip to the sequence they were built from
//! - Ordering keys never collide across protocol versions
//! - Within a version, ordering keys sort in ledger order

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod entry;
pub mod error;
pub mod invoice;
pub mod memo;
pub mod pointer;
pub mod stellar;
pub mod version;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

// Re-exports
pub use entry::{ordering_key_from_cursor, Entry, EntryKind, StellarEntry};
pub use error::{Error, Result};
pub use invoice::{HashPrefix, Invoice, LineItem, TxHash, HASH_PREFIX_LEN, TX_HASH_LEN};
pub use memo::{KinMemo, TransactionType};
pub use pointer::{cursor_from_pointer, pointer_from_sequence, sequence_from_pointer, Pointer};
pub use version::KinVersion;
