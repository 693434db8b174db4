//! Row, record and result types shared by the pipeline stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A CSV data row mapped onto the canonical game shape.
///
/// Only rows carrying `game_number`, `game_name` and `state` are ever
/// constructed by the parser.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedRow {
    /// Source line number (header is line 1).
    pub line: usize,
    pub game_number: String,
    pub game_name: String,
    /// Upper-cased state code, e.g. "GA".
    pub state: String,
    pub price: f64,
    pub top_prize: f64,
    pub top_prizes_remaining: i64,
    pub total_top_prizes: i64,
    pub overall_odds: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub image_url: Option<String>,
    pub source: Option<String>,
    pub source_url: Option<String>,
}

impl ParsedRow {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            game_number: self.game_number.clone(),
            state: self.state.clone(),
            top_prize: self.top_prize,
        }
    }

    /// Human-readable label used in the result's inserted/updated lists.
    pub fn label(&self) -> String {
        format!("{} (#{}, {})", self.game_name, self.game_number, self.state)
    }
}

/// The (`game_number`, `state`, `top_prize`) triple that identifies a game.
#[derive(Debug, Clone, PartialEq)]
pub struct NaturalKey {
    pub game_number: String,
    pub state: String,
    pub top_prize: f64,
}

/// A persisted game as stored in the `games` table.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct GameRecord {
    pub id: Uuid,
    pub game_number: String,
    pub game_name: String,
    pub state: String,
    pub price: f64,
    pub top_prize: f64,
    pub top_prizes_remaining: i64,
    pub total_top_prizes: i64,
    pub overall_odds: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub image_url: Option<String>,
    pub image_converted: Option<bool>,
    pub source: Option<String>,
    pub source_url: Option<String>,
    pub rank: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GameRecord {
    /// A fresh record for a first-seen natural key. Rank starts at 0 until
    /// the ranking recompute runs.
    pub fn from_parsed(row: &ParsedRow, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            game_number: row.game_number.clone(),
            game_name: row.game_name.clone(),
            state: row.state.clone(),
            price: row.price,
            top_prize: row.top_prize,
            top_prizes_remaining: row.top_prizes_remaining,
            total_top_prizes: row.total_top_prizes,
            overall_odds: row.overall_odds.clone(),
            start_date: row.start_date.clone(),
            end_date: row.end_date.clone(),
            image_url: row.image_url.clone(),
            image_converted: Some(false),
            source: row.source.clone(),
            source_url: row.source_url.clone(),
            rank: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_image_converted(&self) -> bool {
        self.image_converted.unwrap_or(false)
    }

    /// Apply `update` the way the `games` UPDATE statement does.
    pub fn apply(&mut self, update: &GameUpdate) {
        self.top_prizes_remaining = update.top_prizes_remaining;
        self.total_top_prizes = update.total_top_prizes;
        self.end_date = update.end_date.clone();
        if let Some(url) = &update.image_url {
            self.image_url = Some(url.clone());
        }
        if let Some(source) = &update.source {
            self.source = Some(source.clone());
        }
        if let Some(url) = &update.source_url {
            self.source_url = Some(url.clone());
        }
        self.updated_at = update.updated_at;
    }
}

/// Field changes applied to an existing game on re-import.
///
/// `None` for a guarded field means "leave the stored value alone".
#[derive(Debug, Clone, PartialEq)]
pub struct GameUpdate {
    pub top_prizes_remaining: i64,
    pub total_top_prizes: i64,
    pub end_date: Option<String>,
    pub image_url: Option<String>,
    pub source: Option<String>,
    pub source_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Success,
    Partial,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Success => "success",
            ImportStatus::Partial => "partial",
            ImportStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(ImportStatus::Success),
            "partial" => Some(ImportStatus::Partial),
            "failed" => Some(ImportStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRow {
    pub row: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportDetails {
    pub inserted: Vec<String>,
    pub updated: Vec<String>,
    pub failed: Vec<FailedRow>,
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportResult {
    pub status: ImportStatus,
    pub records_processed: usize,
    pub records_inserted: usize,
    pub records_updated: usize,
    pub records_failed: usize,
    pub details: ImportDetails,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

/// An append-only `import_logs` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportLogEntry {
    pub id: Uuid,
    pub source_url: String,
    pub content_hash: String,
    pub status: ImportStatus,
    pub records_processed: usize,
    pub records_inserted: usize,
    pub records_updated: usize,
    pub records_failed: usize,
    pub details: ImportDetails,
    pub created_at: DateTime<Utc>,
}

impl ImportLogEntry {
    pub fn from_result(source_url: &str, content_hash: &str, result: &ImportResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_url: source_url.to_string(),
            content_hash: content_hash.to_string(),
            status: result.status,
            records_processed: result.records_processed,
            records_inserted: result.records_inserted,
            records_updated: result.records_updated,
            records_failed: result.records_failed,
            details: result.details.clone(),
            created_at: Utc::now(),
        }
    }
}
