//! Configuration for the invoice store

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Invoice store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Records returned per query page
    pub page_size: usize,

    /// How long a conditional put waits for a row lock (milliseconds)
    pub lock_timeout_ms: i64,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/invoices"),
            page_size: 100,
            lock_timeout_ms: 1_000,
            rocksdb: RocksDBConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Bloom filter bits per key for point lookups
    pub bloom_bits_per_key: f64,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 3,
            max_background_jobs: 2,
            bloom_bits_per_key: 10.0,
            enable_statistics: false,
        }
    }
}

impl StoreConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StoreConfig = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = StoreConfig::default();

        if let Ok(data_dir) = std::env::var("INVOICE_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(page_size) = std::env::var("INVOICE_PAGE_SIZE") {
            config.page_size = page_size
                .parse()
                .map_err(|e| crate::Error::Config(format!("INVOICE_PAGE_SIZE: {}", e)))?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.page_size, 100);
        assert_eq!(config.data_dir, PathBuf::from("./data/invoices"));
    }

    #[test]
    fn test_partial_toml() {
        let config: StoreConfig = toml::from_str(
            r#"
            page_size = 7

            [rocksdb]
            max_background_jobs = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.page_size, 7);
        assert_eq!(config.rocksdb.max_background_jobs, 4);
        assert_eq!(config.lock_timeout_ms, 1_000);
    }
}
