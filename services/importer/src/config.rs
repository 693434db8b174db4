use anyhow::{Context, Result};
use std::path::PathBuf;

/// Path segment that precedes `<bucket>/<path>` in public object URLs.
pub const PUBLIC_OBJECT_SEGMENT: &str = "/storage/v1/object/public/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawStore {
    Fs,
    Http,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_url: Option<String>,
    pub raw_store: RawStore,
    pub raw_fs_dir: PathBuf,
    pub storage_base_url: Option<String>,
    pub storage_service_key: Option<String>,
    pub batch_size: usize,
    pub fetch_timeout_secs: u64,
    pub api_bind: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_url: None,
            raw_store: RawStore::Fs,
            raw_fs_dir: PathBuf::from("./data/raw"),
            storage_base_url: None,
            storage_service_key: None,
            batch_size: 10,
            fetch_timeout_secs: 120,
            api_bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let raw_store = match std::env::var("RAW_STORE")
            .unwrap_or_else(|_| "fs".to_string())
            .to_lowercase()
            .as_str()
        {
            "fs" => RawStore::Fs,
            "http" => RawStore::Http,
            other => anyhow::bail!("RAW_STORE must be 'fs' or 'http', got '{}'", other),
        };

        Ok(Self {
            db_url: std::env::var("DB_URL").ok(),
            raw_store,
            raw_fs_dir: std::env::var("RAW_FS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.raw_fs_dir),
            storage_base_url: std::env::var("STORAGE_BASE_URL")
                .ok()
                .map(|u| u.trim_end_matches('/').to_string()),
            storage_service_key: std::env::var("STORAGE_SERVICE_KEY").ok(),
            batch_size: env_or("IMPORT_BATCH_SIZE", defaults.batch_size).max(1),
            fetch_timeout_secs: env_or("FETCH_TIMEOUT_SECS", defaults.fetch_timeout_secs),
            api_bind: std::env::var("API_BIND").unwrap_or(defaults.api_bind),
        })
    }

    pub fn require_db_url(&self) -> Result<&str> {
        self.db_url.as_deref().context("DB_URL env var missing")
    }

    /// Prefix identifying public URLs that point into our own object storage.
    pub fn public_object_prefix(&self) -> Option<String> {
        self.storage_base_url
            .as_ref()
            .map(|base| format!("{}{}", base, PUBLIC_OBJECT_SEGMENT))
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_prefix_from_base_url() {
        let config = Config {
            storage_base_url: Some("https://files.example.com".to_string()),
            ..Config::default()
        };
        assert_eq!(
            config.public_object_prefix().as_deref(),
            Some("https://files.example.com/storage/v1/object/public/")
        );
    }

    #[test]
    fn no_prefix_without_base_url() {
        assert!(Config::default().public_object_prefix().is_none());
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.fetch_timeout_secs, 120);
        assert_eq!(config.raw_store, RawStore::Fs);
        assert!(config.require_db_url().is_err());
    }
}
