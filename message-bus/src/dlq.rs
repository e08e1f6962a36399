//! Dead-letter queue
//!
//! Tasks end up here when a handler reports a permanent failure, or when
//! transient failures exhaust the delivery budget.

use crate::{message::Message, metrics::MESSAGE_DEAD_LETTER_TOTAL, Error, Result};
use async_nats::jetstream::Context as JetStreamContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Subject prefix for dead letters
pub const DLQ_SUBJECT_PREFIX: &str = "dlq";

/// Dead-lettered task with failure metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DlqEntry {
    /// Entry ID
    pub id: Uuid,

    /// Task as submitted
    pub message: Message,

    /// Last failure reason
    pub failure_reason: String,

    /// Deliveries attempted
    pub attempts: u32,

    /// Handler declared the failure permanent
    pub permanent: bool,

    /// When the task was given up on
    pub failed_at: DateTime<Utc>,
}

impl DlqEntry {
    /// Create entry for a failed task
    pub fn new(message: Message, failure_reason: impl Into<String>, attempts: u32, permanent: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            message,
            failure_reason: failure_reason.into(),
            attempts,
            permanent,
            failed_at: Utc::now(),
        }
    }

    /// Metric label
    pub fn reason_label(&self) -> &'static str {
        if self.permanent {
            "permanent"
        } else {
            "exhausted"
        }
    }
}

/// Destination for tasks that will not be retried
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Store a dead letter
    async fn dead_letter(&self, entry: DlqEntry) -> Result<()>;
}

/// Dead letters kept in memory
#[derive(Debug, Default)]
pub struct MemoryDeadLetters {
    entries: Mutex<Vec<DlqEntry>>,
}

impl MemoryDeadLetters {
    /// Create empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of stored entries
    pub fn entries(&self) -> Vec<DlqEntry> {
        self.entries.lock().clone()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing was dead-lettered
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetters {
    async fn dead_letter(&self, entry: DlqEntry) -> Result<()> {
        record(&entry);
        self.entries.lock().push(entry);
        Ok(())
    }
}

/// Dead letters published as JSON to `dlq.<type>`
#[derive(Clone)]
pub struct JetStreamDeadLetters {
    context: JetStreamContext,
}

impl std::fmt::Debug for JetStreamDeadLetters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JetStreamDeadLetters").finish_non_exhaustive()
    }
}

impl JetStreamDeadLetters {
    /// Create sink on a JetStream context
    pub fn new(context: JetStreamContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl DeadLetterSink for JetStreamDeadLetters {
    async fn dead_letter(&self, entry: DlqEntry) -> Result<()> {
        let payload = serde_json::to_vec(&entry).map_err(|e| Error::Serialization(e.to_string()))?;
        let subject = entry.message.subject(DLQ_SUBJECT_PREFIX);

        self.context
            .publish(subject, payload.into())
            .await
            .map_err(|e| Error::Publish(e.to_string()))?
            .await
            .map_err(|e| Error::Publish(e.to_string()))?;

        record(&entry);
        Ok(())
    }
}

fn record(entry: &DlqEntry) {
    MESSAGE_DEAD_LETTER_TOTAL
        .with_label_values(&[entry.message.type_name.as_str(), entry.reason_label()])
        .inc();

    warn!(
        message_id = %entry.message.id,
        message_type = %entry.message.type_name,
        attempts = entry.attempts,
        permanent = entry.permanent,
        reason = %entry.failure_reason,
        "Task moved to dead-letter queue"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_dead_letters() {
        let sink = MemoryDeadLetters::new();
        assert!(sink.is_empty());

        let msg = Message::new("t", vec![1]);
        sink.dead_letter(DlqEntry::new(msg.clone(), "boom", 1, true))
            .await
            .unwrap();

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, msg);
        assert_eq!(entries[0].reason_label(), "permanent");
    }

    #[test]
    fn test_entry_json() {
        let entry = DlqEntry::new(Message::new("t", vec![]), "timeout", 5, false);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["failure_reason"], "timeout");
        assert_eq!(json["attempts"], 5);
        assert_eq!(entry.reason_label(), "exhausted");
    }
}
