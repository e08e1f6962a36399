//! Task queue with in-process and NATS JetStream transports
//!
//! Provides at-least-once task delivery with:
//! - `Submitter` / `MessageHandler` contracts, independent of transport
//! - In-process `WorkQueue` for single-node deployments and tests
//! - JetStream persistence with `Nats-Msg-Id` deduplication
//! - Redelivery with exponential backoff, bounded by `max_deliver`
//! - Dead Letter Queue for permanent and exhausted failures
//! - Observability via Prometheus metrics

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod client;
pub mod dlq;
pub mod error;
pub mod handler;
pub mod message;
pub mod metrics;
pub mod publisher;
pub mod queue;
pub mod subscriber;

pub use client::{NatsClient, NatsConfig};
pub use dlq::{DeadLetterSink, DlqEntry, JetStreamDeadLetters, MemoryDeadLetters};
pub use error::{Error, HandlerError, Result};
pub use handler::{MessageHandler, Submitter};
pub use message::Message;
pub use publisher::{JetStreamSubmitter, PublisherConfig};
pub use queue::{QueueConfig, WorkQueue};
pub use subscriber::{JetStreamConsumer, SubscriberConfig};
