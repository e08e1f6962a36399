//! Task envelope

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header carrying the deduplication key
pub const HEADER_MSG_ID: &str = "Nats-Msg-Id";

/// Header carrying the type tag
pub const HEADER_TASK_TYPE: &str = "Task-Type";

/// Header carrying the task id
pub const HEADER_TASK_ID: &str = "Task-Id";

/// Header carrying the submit time (RFC 3339)
pub const HEADER_SUBMITTED_AT: &str = "Task-Submitted-At";

/// Task submitted to a queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message ID (UUIDv7 for ordering)
    pub id: Uuid,

    /// Type tag of the payload
    pub type_name: String,

    /// Serialized payload
    pub raw_value: Vec<u8>,

    /// Timestamp
    pub submitted_at: DateTime<Utc>,
}

impl Message {
    /// Create new message
    pub fn new(type_name: impl Into<String>, raw_value: Vec<u8>) -> Self {
        Self {
            id: Uuid::now_v7(),
            type_name: type_name.into(),
            raw_value,
            submitted_at: Utc::now(),
        }
    }

    /// Deduplication key: identical payloads of one type share it
    pub fn dedup_id(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.type_name.as_bytes());
        hasher.update(&[0]);
        hasher.update(&self.raw_value);
        hasher.finalize().to_hex().to_string()
    }

    /// Subject under a prefix, e.g. `tasks.history.v1.Entry`
    pub fn subject(&self, prefix: &str) -> String {
        format!("{}.{}", prefix, self.type_name)
    }
}
