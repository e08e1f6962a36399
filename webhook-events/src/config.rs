//! Service configuration

use crate::{
    app::{AppConfig, MemoryAppConfigStore},
    error::{Error, Result},
    webhook::WebhookConfig,
};
use invoice_store::StoreConfig;
use message_bus::{JetStreamSubmitter, NatsClient, NatsConfig, PublisherConfig, SubscriberConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file path variable
pub const CONFIG_PATH_VAR: &str = "WEBHOOK_EVENTS_CONFIG";

/// Webhook events service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// NATS connection and streams
    pub nats: NatsConfig,

    /// Task publishing
    pub publisher: PublisherConfig,

    /// Task consumption and redelivery
    pub subscriber: SubscriberConfig,

    /// Invoice store
    pub invoices: StoreConfig,

    /// Webhook client
    pub webhook: WebhookConfig,

    /// Registered apps
    pub apps: Vec<AppEntry>,
}

/// App registered under an application index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppEntry {
    /// Index carried in transaction memos
    pub app_index: u16,

    /// Webhook configuration
    #[serde(flatten)]
    pub config: AppConfig,
}

impl ServiceConfig {
    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Defaults with environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// File named by `WEBHOOK_EVENTS_CONFIG` (defaults otherwise), then
    /// environment overrides
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides read through `get`
    pub fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = get("WEBHOOK_EVENTS_NATS_URL") {
            self.nats.url = url;
        }

        if let Some(name) = get("WEBHOOK_EVENTS_DURABLE_NAME") {
            self.subscriber.durable_name = name;
        }

        if let Some(timeout) = get("WEBHOOK_EVENTS_WEBHOOK_TIMEOUT_MS") {
            self.webhook.timeout_ms = timeout
                .parse()
                .map_err(|e| Error::Config(format!("WEBHOOK_EVENTS_WEBHOOK_TIMEOUT_MS: {}", e)))?;
        }

        if let Some(data_dir) = get("INVOICE_DATA_DIR") {
            self.invoices.data_dir = PathBuf::from(data_dir);
        }

        Ok(())
    }

    /// Submitter for ingesters feeding entries to the workers
    pub fn submitter(&self, client: &NatsClient) -> JetStreamSubmitter {
        JetStreamSubmitter::new(client.clone(), self.publisher.clone())
    }

    /// App config store seeded with the registered apps
    pub fn app_store(&self) -> MemoryAppConfigStore {
        self.apps
            .iter()
            .map(|entry| (entry.app_index, entry.config.clone()))
            .collect()
    }
}
