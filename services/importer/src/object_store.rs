//! Object storage backends used to read self-hosted CSV files directly,
//! without going through the public HTTP gateway.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use crate::config::{Config, RawStore, PUBLIC_OBJECT_SEGMENT};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>>;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// Build the backend selected by `RAW_STORE`.
pub fn from_config(config: &Config, client: reqwest::Client) -> Result<Box<dyn ObjectStore>> {
    match config.raw_store {
        RawStore::Fs => Ok(Box::new(FsObjectStore::new(
            config.raw_fs_dir.clone(),
            config.storage_base_url.clone(),
        ))),
        RawStore::Http => {
            let base = config
                .storage_base_url
                .clone()
                .context("RAW_STORE=http requires STORAGE_BASE_URL")?;
            Ok(Box::new(HttpObjectStore::new(
                client,
                base,
                config.storage_service_key.clone(),
            )))
        }
    }
}

/// Objects stored on the local filesystem at `<root>/<bucket>/<path>`.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
    public_base: Option<String>,
}

impl FsObjectStore {
    pub fn new(root: PathBuf, public_base: Option<String>) -> Self {
        Self { root, public_base }
    }

    fn object_path(&self, bucket: &str, path: &str) -> Result<PathBuf> {
        let relative = Path::new(bucket).join(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            anyhow::bail!("object path must be relative and stay inside its bucket: {}", relative.display());
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        let full = self.object_path(bucket, path)?;
        tokio::fs::read(&full)
            .await
            .with_context(|| format!("Failed to read {}", full.display()))
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        match &self.public_base {
            Some(base) => format!("{}{}{}/{}", base, PUBLIC_OBJECT_SEGMENT, bucket, path),
            None => format!("storage://{}/{}", bucket, path),
        }
    }
}

/// Objects served by the storage service's authenticated download endpoint.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
    service_key: Option<String>,
}

impl HttpObjectStore {
    pub fn new(client: reqwest::Client, base_url: String, service_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, path);
        let mut req = self.client.get(&url);
        if let Some(key) = &self.service_key {
            req = req.bearer_auth(key);
        }
        let resp = req
            .send()
            .await?
            .error_for_status()
            .context("Storage download request failed")?;
        Ok(resp.bytes().await?.to_vec())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}{}{}/{}", self.base_url, PUBLIC_OBJECT_SEGMENT, bucket, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_store_reads_bucket_relative_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("csv-imports")).unwrap();
        std::fs::write(dir.path().join("csv-imports/ga.csv"), b"game_number\n1\n").unwrap();

        let store = FsObjectStore::new(dir.path().to_path_buf(), None);
        let bytes = store.download("csv-imports", "ga.csv").await.unwrap();
        assert_eq!(bytes, b"game_number\n1\n");
    }

    #[tokio::test]
    async fn fs_store_rejects_parent_components() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path().to_path_buf(), None);
        let err = store.download("csv-imports", "../secret.csv").await.unwrap_err();
        assert!(err.to_string().contains("inside its bucket"));
    }

    #[tokio::test]
    async fn fs_store_missing_object_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path().to_path_buf(), None);
        assert!(store.download("csv-imports", "nope.csv").await.is_err());
    }

    #[test]
    fn public_urls_use_public_segment() {
        let fs = FsObjectStore::new(PathBuf::from("/tmp"), Some("https://files.example.com".into()));
        assert_eq!(
            fs.public_url("csv-imports", "ga.csv"),
            "https://files.example.com/storage/v1/object/public/csv-imports/ga.csv"
        );

        let http = HttpObjectStore::new(
            reqwest::Client::new(),
            "https://files.example.com/".into(),
            None,
        );
        assert_eq!(
            http.public_url("csv-imports", "ga.csv"),
            "https://files.example.com/storage/v1/object/public/csv-imports/ga.csv"
        );
        assert_eq!(
            FsObjectStore::new(PathBuf::from("/tmp"), None).public_url("b", "p.csv"),
            "storage://b/p.csv"
        );
    }
}
