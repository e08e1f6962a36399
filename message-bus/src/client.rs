//! NATS connection and JetStream streams
//!
//! Two streams:
//! - task stream (`<prefix>.>`): work-queue retention, deduplicated by
//!   `Nats-Msg-Id` within the duplicate window
//! - dead-letter stream (`dlq.>`): limits retention, kept for inspection

use crate::{dlq::DLQ_SUBJECT_PREFIX, Error, Result};
use async_nats::jetstream::{
    self,
    consumer::PullConsumer,
    stream::{Config as StreamConfig, RetentionPolicy, StorageType},
    Context as JetStreamContext,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// NATS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// Server URL
    pub url: String,

    /// Task stream name
    pub stream_name: String,

    /// Task subject prefix
    pub subject_prefix: String,

    /// Dead-letter stream name
    pub dlq_stream_name: String,

    /// Stream replicas
    pub num_replicas: usize,

    /// Deduplication window (seconds)
    pub duplicate_window_secs: u64,

    /// Task retention (seconds)
    pub max_age_secs: u64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            stream_name: "HISTORY_TASKS".to_string(),
            subject_prefix: "tasks".to_string(),
            dlq_stream_name: "HISTORY_DLQ".to_string(),
            num_replicas: 1,
            duplicate_window_secs: 120,
            max_age_secs: 7 * 24 * 3600,
        }
    }
}

/// Connected NATS client with its JetStream context
#[derive(Clone)]
pub struct NatsClient {
    context: JetStreamContext,
    config: NatsConfig,
}

impl std::fmt::Debug for NatsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsClient")
            .field("url", &self.config.url)
            .field("stream_name", &self.config.stream_name)
            .finish_non_exhaustive()
    }
}

impl NatsClient {
    /// Connect and ensure both streams exist
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        info!(url = %config.url, "Connecting to NATS JetStream");

        let client = async_nats::connect(config.url.as_str())
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let nats = Self {
            context: jetstream::new(client),
            config,
        };

        nats.create_task_stream().await?;
        nats.create_dlq_stream().await?;

        Ok(nats)
    }

    /// JetStream context
    pub fn jetstream(&self) -> &JetStreamContext {
        &self.context
    }

    /// Configuration
    pub fn config(&self) -> &NatsConfig {
        &self.config
    }

    async fn create_task_stream(&self) -> Result<()> {
        let stream_name = self.config.stream_name.clone();

        let config = StreamConfig {
            name: stream_name.clone(),
            description: Some("History tasks".to_string()),
            subjects: vec![format!("{}.>", self.config.subject_prefix)],
            retention: RetentionPolicy::WorkQueue,
            max_age: Duration::from_secs(self.config.max_age_secs),
            storage: StorageType::File,
            num_replicas: self.config.num_replicas,
            duplicate_window: Duration::from_secs(self.config.duplicate_window_secs),
            ..Default::default()
        };

        match self.context.get_or_create_stream(config).await {
            Ok(_) => {
                info!(stream = %stream_name, "Task stream ready");
                Ok(())
            }
            Err(e) => {
                error!("Failed to create stream {}: {}", stream_name, e);
                Err(Error::JetStream(e.to_string()))
            }
        }
    }

    async fn create_dlq_stream(&self) -> Result<()> {
        let stream_name = self.config.dlq_stream_name.clone();

        let config = StreamConfig {
            name: stream_name.clone(),
            description: Some("Dead Letter Queue for failed tasks".to_string()),
            subjects: vec![format!("{}.>", DLQ_SUBJECT_PREFIX)],
            retention: RetentionPolicy::Limits,
            max_age: Duration::from_secs(30 * 24 * 3600),
            storage: StorageType::File,
            num_replicas: self.config.num_replicas,
            ..Default::default()
        };

        match self.context.get_or_create_stream(config).await {
            Ok(_) => {
                info!(stream = %stream_name, "DLQ stream ready");
                Ok(())
            }
            Err(e) => {
                error!("Failed to create DLQ stream: {}", e);
                Err(Error::JetStream(e.to_string()))
            }
        }
    }

    /// Durable pull consumer on the task stream
    pub async fn create_consumer(
        &self,
        durable_name: &str,
        ack_wait: Duration,
        max_deliver: i64,
    ) -> Result<PullConsumer> {
        let consumer_config = jetstream::consumer::pull::Config {
            durable_name: Some(durable_name.to_string()),
            filter_subject: format!("{}.>", self.config.subject_prefix),
            ack_policy: jetstream::consumer::AckPolicy::Explicit,
            ack_wait,
            max_deliver,
            deliver_policy: jetstream::consumer::DeliverPolicy::All,
            replay_policy: jetstream::consumer::ReplayPolicy::Instant,
            ..Default::default()
        };

        let consumer = self
            .context
            .create_consumer_on_stream(consumer_config, self.config.stream_name.as_str())
            .await
            .map_err(|e| Error::JetStream(e.to_string()))?;

        info!(consumer = durable_name, "Consumer ready");
        Ok(consumer)
    }
}
