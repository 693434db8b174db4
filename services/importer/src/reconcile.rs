//! Reconciler stage: upsert parsed rows by natural key and account for every
//! row in an [`ImportResult`].
//!
//! Rows are independent writes. A failing row is recorded and the run moves
//! on; nothing here returns early on a row error.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::model::{
    FailedRow, GameRecord, GameUpdate, ImportDetails, ImportResult, ImportStatus, NaturalKey,
    ParsedRow,
};
use crate::store::GameStore;

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub batch_size: usize,
    /// Look up rows and report what would change, without writing.
    pub dry_run: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowOutcome {
    Inserted,
    Updated,
}

/// Fields to change on `existing` when `row` is seen again.
///
/// Counts and the end date always follow the feed. The image is only
/// replaced while it has not been converted to owned storage, and the
/// source fields are only filled when still blank.
pub fn plan_update(existing: &GameRecord, row: &ParsedRow, now: DateTime<Utc>) -> GameUpdate {
    let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());

    GameUpdate {
        top_prizes_remaining: row.top_prizes_remaining,
        total_top_prizes: row.total_top_prizes,
        end_date: row.end_date.clone(),
        image_url: if existing.is_image_converted() {
            None
        } else {
            row.image_url.clone()
        },
        source: if blank(&existing.source) {
            row.source.clone()
        } else {
            None
        },
        source_url: if blank(&existing.source_url) {
            row.source_url.clone()
        } else {
            None
        },
        updated_at: now,
    }
}

pub fn final_status(processed: usize, failed: usize) -> ImportStatus {
    if processed > 0 && failed == processed {
        ImportStatus::Failed
    } else if failed > 0 {
        ImportStatus::Partial
    } else {
        ImportStatus::Success
    }
}

/// `planned` holds keys a dry run has already counted as inserts, so a
/// repeated key reports as an update the way a live run would.
async fn reconcile_row(
    store: &dyn GameStore,
    row: &ParsedRow,
    dry_run: bool,
    planned: &mut Vec<NaturalKey>,
) -> anyhow::Result<RowOutcome> {
    let key = row.natural_key();
    let matches = store.find_by_natural_key(&key).await?;
    if matches.len() > 1 {
        warn!(
            line = row.line,
            game = %row.game_number,
            state = %row.state,
            count = matches.len(),
            "Natural key matches several games; updating the oldest"
        );
    }

    match matches.first() {
        None if dry_run => {
            if planned.contains(&key) {
                return Ok(RowOutcome::Updated);
            }
            planned.push(key);
            Ok(RowOutcome::Inserted)
        }
        None => {
            store.insert_game(row).await?;
            Ok(RowOutcome::Inserted)
        }
        Some(existing) => {
            if !dry_run {
                let update = plan_update(existing, row, Utc::now());
                store.update_game(existing.id, &update).await?;
            }
            Ok(RowOutcome::Updated)
        }
    }
}

pub async fn reconcile(
    store: &dyn GameStore,
    rows: &[ParsedRow],
    options: &ReconcileOptions,
) -> ImportResult {
    let batch_size = options.batch_size.max(1);
    let batches = rows.len().div_ceil(batch_size);
    let mut details = ImportDetails::default();
    let mut processed = 0usize;
    let mut planned = Vec::new();

    for (batch_idx, batch) in rows.chunks(batch_size).enumerate() {
        info!(
            "Processing batch {}/{} ({} rows)",
            batch_idx + 1,
            batches,
            batch.len()
        );
        for row in batch {
            processed += 1;
            match reconcile_row(store, row, options.dry_run, &mut planned).await {
                Ok(RowOutcome::Inserted) => details.inserted.push(row.label()),
                Ok(RowOutcome::Updated) => details.updated.push(row.label()),
                Err(e) => {
                    error!(line = row.line, game = %row.game_number, "Row failed: {:#}", e);
                    details.failed.push(FailedRow {
                        row: row.line,
                        error: format!("{:#}", e),
                    });
                }
            }
        }
    }

    let result = ImportResult {
        status: final_status(processed, details.failed.len()),
        records_processed: processed,
        records_inserted: details.inserted.len(),
        records_updated: details.updated.len(),
        records_failed: details.failed.len(),
        details,
        dry_run: options.dry_run,
    };
    info!(
        status = result.status.as_str(),
        processed = result.records_processed,
        inserted = result.records_inserted,
        updated = result.records_updated,
        failed = result.records_failed,
        "Reconciliation finished"
    );
    result
}
