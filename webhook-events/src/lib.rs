//! Webhook event notifications for ledger transactions
//!
//! Entries written by ingesters are queued, correlated with their invoice
//! and owning app, and delivered to the app's events webhook as a signed
//! JSON array.
//!
//! - [`Processor`] enqueues entries on any [`message_bus::Submitter`]
//! - [`EventHandler`] processes deliveries from any task queue
//! - [`HttpWebhookClient`] signs bodies with HMAC-SHA256
//! - [`ServiceConfig`] wires the `webhook-events` worker binary

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod app;
pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod processor;
pub mod webhook;

pub use app::{AppConfig, AppConfigError, AppConfigStore, MemoryAppConfigStore};
pub use config::{AppEntry, ServiceConfig};
pub use error::{Error, Result};
pub use event::{Event, StellarData, TransactionEvent};
pub use processor::{EventHandler, Processor};
pub use webhook::{
    sign_body, HttpWebhookClient, InvoiceError, SignTransactionRequest, SignTransactionResponse,
    WebhookClient, WebhookConfig, WebhookError, HMAC_HEADER,
};
