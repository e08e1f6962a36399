//! App configuration store
//!
//! Apps are addressed by the 16 bit application index carried in Kin memos.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Webhook configuration of one app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Display name
    pub app_name: String,

    /// Events webhook; events are dropped when unset
    #[serde(default)]
    pub events_url: Option<String>,

    /// Sign-transaction webhook
    #[serde(default)]
    pub sign_url: Option<String>,

    /// HMAC key for webhook bodies
    pub webhook_secret: String,
}

/// App config lookup failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppConfigError {
    /// No app registered under the index
    #[error("app config not found")]
    NotFound,

    /// Store could not be reached
    #[error("app config store unavailable: {0}")]
    Unavailable(String),
}

/// Read access to app configs
#[async_trait]
pub trait AppConfigStore: Send + Sync {
    /// Config of the app at `app_index`
    async fn get(&self, app_index: u16) -> Result<AppConfig, AppConfigError>;
}

/// In-memory app configs
#[derive(Debug, Default)]
pub struct MemoryAppConfigStore {
    apps: DashMap<u16, AppConfig>,
}

impl MemoryAppConfigStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an app
    pub fn add(&self, app_index: u16, config: AppConfig) {
        self.apps.insert(app_index, config);
    }
}

impl FromIterator<(u16, AppConfig)> for MemoryAppConfigStore {
    fn from_iter<I: IntoIterator<Item = (u16, AppConfig)>>(iter: I) -> Self {
        Self {
            apps: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl AppConfigStore for MemoryAppConfigStore {
    async fn get(&self, app_index: u16) -> Result<AppConfig, AppConfigError> {
        self.apps
            .get(&app_index)
            .map(|config| config.value().clone())
            .ok_or(AppConfigError::NotFound)
    }
}
