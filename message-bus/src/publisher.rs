//! JetStream task submitter with retry logic

use crate::{
    client::NatsClient,
    handler::Submitter,
    message::{Message, HEADER_MSG_ID, HEADER_SUBMITTED_AT, HEADER_TASK_ID, HEADER_TASK_TYPE},
    metrics::{MESSAGE_SUBMIT_DURATION, MESSAGE_SUBMIT_TOTAL},
    Error, Result,
};
use async_nats::HeaderMap;
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Publisher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Give up after this long (milliseconds)
    pub publish_timeout_ms: u64,

    /// Initial retry delay (milliseconds)
    pub initial_retry_delay_ms: u64,

    /// Max retry delay (milliseconds)
    pub max_retry_delay_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            publish_timeout_ms: 5_000,
            initial_retry_delay_ms: 100,
            max_retry_delay_ms: 2_000,
        }
    }
}

/// Submits tasks to the JetStream task stream
#[derive(Debug, Clone)]
pub struct JetStreamSubmitter {
    client: NatsClient,
    config: PublisherConfig,
}

impl JetStreamSubmitter {
    /// Create new submitter
    pub fn new(client: NatsClient, config: PublisherConfig) -> Self {
        Self { client, config }
    }

    /// Single publish attempt, waiting for the stream ack
    async fn publish_once(&self, subject: &str, headers: &HeaderMap, message: &Message) -> Result<()> {
        let ack = self
            .client
            .jetstream()
            .publish_with_headers(
                subject.to_string(),
                headers.clone(),
                message.raw_value.clone().into(),
            )
            .await
            .map_err(|e| Error::Publish(e.to_string()))?;

        let ack = ack
            .await
            .map_err(|e| Error::Publish(format!("Publish ack failed: {}", e)))?;

        if ack.duplicate {
            debug!(message_id = %message.id, "Task already in stream");
        }

        Ok(())
    }
}

/// Headers carried with a task
pub(crate) fn task_headers(message: &Message) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(HEADER_MSG_ID, message.dedup_id().as_str());
    headers.insert(HEADER_TASK_TYPE, message.type_name.as_str());
    headers.insert(HEADER_TASK_ID, message.id.to_string().as_str());
    headers.insert(HEADER_SUBMITTED_AT, message.submitted_at.to_rfc3339().as_str());
    headers
}

#[async_trait]
impl Submitter for JetStreamSubmitter {
    async fn submit(&self, message: Message) -> Result<()> {
        let start = Instant::now();
        let subject = message.subject(&self.client.config().subject_prefix);
        let headers = task_headers(&message);

        debug!(message_id = %message.id, %subject, "Submitting task");

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.config.initial_retry_delay_ms))
            .with_max_interval(Duration::from_millis(self.config.max_retry_delay_ms))
            .with_max_elapsed_time(Some(Duration::from_millis(self.config.publish_timeout_ms)))
            .build();

        let result = backoff::future::retry(policy, || async {
            self.publish_once(&subject, &headers, &message)
                .await
                .map_err(|e| {
                    warn!(message_id = %message.id, "Publish failed, retrying: {}", e);
                    backoff::Error::transient(e)
                })
        })
        .await;

        MESSAGE_SUBMIT_DURATION
            .with_label_values(&[message.type_name.as_str()])
            .observe(start.elapsed().as_secs_f64());

        let status = if result.is_ok() { "success" } else { "error" };
        MESSAGE_SUBMIT_TOTAL
            .with_label_values(&[message.type_name.as_str(), status])
            .inc();

        result
    }
}
