//! JetStream task consumer
//!
//! Ack policy per delivery:
//! - handler success: ack
//! - transient failure: nak with backoff delay, unless this was the last
//!   allowed delivery
//! - permanent failure or last delivery: term and dead-letter
//! - undecodable headers: term and dead-letter

use crate::{
    client::NatsClient,
    dlq::{DeadLetterSink, DlqEntry},
    error::HandlerError,
    handler::{handle_within, MessageHandler},
    message::{Message, HEADER_SUBMITTED_AT, HEADER_TASK_ID, HEADER_TASK_TYPE},
    metrics::{
        outcome_label, MESSAGE_PROCESS_DURATION, MESSAGE_PROCESS_TOTAL, MESSAGE_REDELIVERY_TOTAL,
    },
    queue::QueueConfig,
    Error, Result,
};
use async_nats::jetstream::{self, AckKind};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Subscriber configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberConfig {
    /// Durable consumer name
    pub durable_name: String,

    /// Acknowledgment wait time (seconds)
    pub ack_wait_secs: u64,

    /// Delivery and backoff policy
    pub delivery: QueueConfig,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            durable_name: "webhook-events".to_string(),
            ack_wait_secs: 30,
            delivery: QueueConfig::default(),
        }
    }
}

impl SubscriberConfig {
    /// Handler deadline; never past the ack wait, so a stuck handler
    /// cannot race a server-side redelivery
    pub fn handler_deadline(&self) -> Duration {
        Duration::from_millis(self.delivery.handler_timeout_ms)
            .min(Duration::from_secs(self.ack_wait_secs))
    }
}

/// Pulls tasks from the task stream and hands them to a handler
#[derive(Debug)]
pub struct JetStreamConsumer {
    client: NatsClient,
    config: SubscriberConfig,
}

impl JetStreamConsumer {
    /// Create new consumer
    pub fn new(client: NatsClient, config: SubscriberConfig) -> Self {
        Self { client, config }
    }

    /// Process deliveries until `cancel` fires or the stream ends
    pub async fn run(
        &self,
        handler: Arc<dyn MessageHandler>,
        dead_letters: Arc<dyn DeadLetterSink>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let delivery = &self.config.delivery;
        let consumer = self
            .client
            .create_consumer(
                &self.config.durable_name,
                Duration::from_secs(self.config.ack_wait_secs),
                i64::from(delivery.max_deliver),
            )
            .await?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| Error::Subscribe(e.to_string()))?;

        info!(consumer = %self.config.durable_name, "Consuming tasks");

        messages
            .take_until(cancel.cancelled())
            .for_each_concurrent(delivery.max_concurrent.max(1), |msg| {
                let handler = Arc::clone(&handler);
                let dead_letters = Arc::clone(&dead_letters);
                async move {
                    match msg {
                        Ok(msg) => self.process(msg, handler.as_ref(), dead_letters.as_ref()).await,
                        Err(e) => error!("Failed to receive task: {}", e),
                    }
                }
            })
            .await;

        info!(consumer = %self.config.durable_name, "Consumer stopped");
        Ok(())
    }

    async fn process(
        &self,
        msg: jetstream::Message,
        handler: &dyn MessageHandler,
        dead_letters: &dyn DeadLetterSink,
    ) {
        let attempt = match msg.info() {
            Ok(info) => u32::try_from(info.delivered).unwrap_or(u32::MAX),
            Err(e) => {
                warn!("Missing delivery info: {}", e);
                1
            }
        };

        let message = match decode(&msg) {
            Ok(message) => message,
            Err(e) => {
                error!("Failed to decode task: {}", e);
                let message = Message::new("unknown", msg.payload.to_vec());
                let entry = DlqEntry::new(message, e.to_string(), attempt, true);
                if let Err(e) = dead_letters.dead_letter(entry).await {
                    error!("Failed to dead-letter task: {}", e);
                }
                terminate(&msg).await;
                return;
            }
        };

        let message_type = message.type_name.as_str();
        let span = tracing::debug_span!(
            "deliver",
            message_id = %message.id,
            message_type,
            attempt
        );

        let start = Instant::now();
        let result = handle_within(handler, &message, self.config.handler_deadline())
            .instrument(span)
            .await;

        MESSAGE_PROCESS_DURATION
            .with_label_values(&[message_type])
            .observe(start.elapsed().as_secs_f64());
        MESSAGE_PROCESS_TOTAL
            .with_label_values(&[message_type, outcome_label(&result)])
            .inc();

        let delivery = &self.config.delivery;
        match result {
            Ok(()) => {
                if let Err(e) = msg.ack().await {
                    error!(message_id = %message.id, "Failed to ack task: {}", e);
                } else {
                    debug!(message_id = %message.id, "Task handled");
                }
            }
            Err(HandlerError::Transient(reason)) if attempt < delivery.max_deliver => {
                let delay = delivery.backoff(attempt);
                warn!(message_id = %message.id, attempt, ?delay, %reason, "Task failed, redelivering");
                MESSAGE_REDELIVERY_TOTAL
                    .with_label_values(&[message_type])
                    .inc();
                if let Err(e) = msg.ack_with(AckKind::Nak(Some(delay))).await {
                    error!(message_id = %message.id, "Failed to nak task: {}", e);
                }
            }
            Err(e) => {
                let entry = DlqEntry::new(message, e.reason(), attempt, !e.is_transient());
                if let Err(e) = dead_letters.dead_letter(entry).await {
                    // Leave unacked; ack_wait brings it back
                    error!("Failed to dead-letter task: {}", e);
                    return;
                }
                terminate(&msg).await;
            }
        }
    }
}

async fn terminate(msg: &jetstream::Message) {
    if let Err(e) = msg.ack_with(AckKind::Term).await {
        error!("Failed to terminate task: {}", e);
    }
}

/// Rebuild the submitted message from a delivery
fn decode(msg: &jetstream::Message) -> Result<Message> {
    let headers = msg
        .headers
        .as_ref()
        .ok_or_else(|| Error::Serialization("task without headers".to_string()))?;

    let header = |name: &str| headers.get(name).map(|v| v.as_str().to_string());

    let type_name = header(HEADER_TASK_TYPE)
        .ok_or_else(|| Error::Serialization(format!("missing {} header", HEADER_TASK_TYPE)))?;

    let id = match header(HEADER_TASK_ID) {
        Some(id) => Uuid::parse_str(&id).map_err(|e| Error::Serialization(e.to_string()))?,
        None => Uuid::now_v7(),
    };

    let submitted_at = match header(HEADER_SUBMITTED_AT) {
        Some(ts) => DateTime::parse_from_rfc3339(&ts)
            .map_err(|e| Error::Serialization(e.to_string()))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    Ok(Message {
        id,
        type_name,
        raw_value: msg.payload.to_vec(),
        submitted_at,
    })
}
