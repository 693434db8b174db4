//! One import run: fetch, parse, reconcile, then the audit log and the
//! ranking recompute.
//!
//! Structural failures (fetch, parse) are returned as `Err` with no partial
//! result. Everything after parsing always produces an `ImportResult`.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::columns::ColumnOverrides;
use crate::config::Config;
use crate::error::{ImportError, Result};
use crate::fetch::{Fetcher, SourceLocator};
use crate::model::{ImportLogEntry, ImportResult};
use crate::object_store::ObjectStore;
use crate::parse::parse_games;
use crate::reconcile::{reconcile, ReconcileOptions};
use crate::store::GameStore;

/// Audit entries returned when no limit is given.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;
pub const MAX_HISTORY_LIMIT: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub csv_url: String,
    /// Admitted rows to skip before reconciling.
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub column_mapping: ColumnOverrides,
}

impl ImportRequest {
    pub fn new(csv_url: impl Into<String>) -> Self {
        Self {
            csv_url: csv_url.into(),
            ..Self::default()
        }
    }
}

pub struct Importer<'a> {
    client: &'a reqwest::Client,
    objects: &'a dyn ObjectStore,
    store: &'a dyn GameStore,
    config: &'a Config,
}

impl<'a> Importer<'a> {
    pub fn new(
        client: &'a reqwest::Client,
        objects: &'a dyn ObjectStore,
        store: &'a dyn GameStore,
        config: &'a Config,
    ) -> Self {
        Self {
            client,
            objects,
            store,
            config,
        }
    }

    pub async fn run(&self, request: &ImportRequest) -> Result<ImportResult> {
        let prefix = self.config.public_object_prefix();
        let locator = SourceLocator::resolve(&request.csv_url, prefix.as_deref())?;
        let log_url = match &locator {
            SourceLocator::Storage { bucket, path } => self.objects.public_url(bucket, path),
            SourceLocator::Url(url) => url.clone(),
        };

        let payload = Fetcher::new(self.client, self.objects).fetch(&locator).await?;
        let parsed = parse_games(&payload.text, &request.column_mapping)?;

        let end = match request.limit {
            Some(limit) => request.offset.saturating_add(limit),
            None => usize::MAX,
        }
        .min(parsed.rows.len());
        let start = request.offset.min(end);
        let rows = &parsed.rows[start..end];
        if start > 0 || end < parsed.rows.len() {
            info!(
                "Importing rows {}..{} of {} parsed rows",
                start,
                end,
                parsed.rows.len()
            );
        }

        let options = ReconcileOptions {
            batch_size: self.config.batch_size,
            dry_run: request.dry_run,
        };
        let result = reconcile(self.store, rows, &options).await;

        if request.dry_run {
            info!("Dry run - no audit log written, no ranking recompute");
            return Ok(result);
        }

        let entry = ImportLogEntry::from_result(&log_url, &payload.content_hash, &result);
        match self.store.append_import_log(&entry).await {
            Ok(()) => info!(log_id = %entry.id, "Import log written"),
            Err(e) => error!("Failed to write import log: {:#}", e),
        }

        if result.records_inserted + result.records_updated > 0 {
            match self.store.recompute_ranks().await {
                Ok(()) => info!("Game rankings recomputed"),
                Err(e) => warn!("Ranking recompute failed: {:#}", e),
            }
        }

        Ok(result)
    }
}

/// Most recent import log entries, newest first. `limit` is clamped to
/// 1..=200 and defaults to 20.
pub async fn import_history(store: &dyn GameStore, limit: Option<usize>) -> Result<Vec<ImportLogEntry>> {
    let limit = limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    store
        .recent_import_logs(limit)
        .await
        .map_err(|e| ImportError::store(format!("{:#}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::Field;
    use crate::model::ImportStatus;
    use crate::store::MemoryGameStore;

    #[test]
    fn request_uses_camel_case_wire_names() {
        let req: ImportRequest = serde_json::from_value(serde_json::json!({
            "csvUrl": "https://x.example/a.csv",
            "offset": 20,
            "limit": 10,
            "dryRun": true,
            "columnMapping": { "Jurisdiction": "state" }
        }))
        .unwrap();
        assert_eq!(req.csv_url, "https://x.example/a.csv");
        assert_eq!(req.offset, 20);
        assert_eq!(req.limit, Some(10));
        assert!(req.dry_run);
        assert_eq!(req.column_mapping.get("Jurisdiction"), Some(&Field::State));
    }

    #[test]
    fn request_defaults_optional_fields() {
        let req: ImportRequest =
            serde_json::from_str(r#"{"csvUrl":"storage://csv/a.csv"}"#).unwrap();
        assert_eq!(req, ImportRequest::new("storage://csv/a.csv"));
    }

    #[tokio::test]
    async fn history_is_newest_first_and_clamped() {
        let store = MemoryGameStore::new();
        for processed in 0..3 {
            let result = ImportResult {
                status: ImportStatus::Success,
                records_processed: processed,
                records_inserted: processed,
                records_updated: 0,
                records_failed: 0,
                details: Default::default(),
                dry_run: false,
            };
            store
                .append_import_log(&ImportLogEntry::from_result("https://x.example/a.csv", "sha256:00", &result))
                .await
                .unwrap();
        }

        let all = import_history(&store, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].records_processed, 2);

        let one = import_history(&store, Some(0)).await.unwrap();
        assert_eq!(one.len(), 1);
    }
}
