use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use super::GameStore;
use crate::model::{
    GameRecord, GameUpdate, ImportDetails, ImportLogEntry, ImportStatus, NaturalKey, ParsedRow,
};

const GAME_COLUMNS: &str = "id, game_number, game_name, state, price, top_prize, \
     top_prizes_remaining, total_top_prizes, overall_odds, start_date, end_date, \
     image_url, image_converted, source, source_url, rank, created_at, updated_at";

#[derive(Clone)]
pub struct PgGameStore {
    pool: PgPool,
}

impl PgGameStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(db_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct ImportLogRow {
    id: Uuid,
    source_url: String,
    content_hash: String,
    status: String,
    records_processed: i32,
    records_inserted: i32,
    records_updated: i32,
    records_failed: i32,
    details: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<ImportLogRow> for ImportLogEntry {
    type Error = anyhow::Error;

    fn try_from(row: ImportLogRow) -> Result<Self> {
        let status = ImportStatus::parse(&row.status)
            .with_context(|| format!("Unknown import status '{}'", row.status))?;
        let details: ImportDetails =
            serde_json::from_value(row.details).context("Malformed import log details")?;
        Ok(Self {
            id: row.id,
            source_url: row.source_url,
            content_hash: row.content_hash,
            status,
            records_processed: row.records_processed.max(0) as usize,
            records_inserted: row.records_inserted.max(0) as usize,
            records_updated: row.records_updated.max(0) as usize,
            records_failed: row.records_failed.max(0) as usize,
            details,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl GameStore for PgGameStore {
    async fn find_by_natural_key(&self, key: &NaturalKey) -> Result<Vec<GameRecord>> {
        let games: Vec<GameRecord> = sqlx::query_as(&format!(
            "SELECT {} FROM games \
             WHERE game_number = $1 AND state = $2 AND top_prize = $3 \
             ORDER BY created_at",
            GAME_COLUMNS
        ))
        .bind(&key.game_number)
        .bind(&key.state)
        .bind(key.top_prize)
        .fetch_all(&self.pool)
        .await?;
        Ok(games)
    }

    async fn insert_game(&self, row: &ParsedRow) -> Result<Uuid> {
        let game = GameRecord::from_parsed(row, Utc::now());
        sqlx::query(
            r#"
            INSERT INTO games
            (id, game_number, game_name, state, price, top_prize, top_prizes_remaining,
             total_top_prizes, overall_odds, start_date, end_date, image_url, image_converted,
             source, source_url, rank, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(game.id)
        .bind(&game.game_number)
        .bind(&game.game_name)
        .bind(&game.state)
        .bind(game.price)
        .bind(game.top_prize)
        .bind(game.top_prizes_remaining)
        .bind(game.total_top_prizes)
        .bind(&game.overall_odds)
        .bind(&game.start_date)
        .bind(&game.end_date)
        .bind(&game.image_url)
        .bind(game.image_converted)
        .bind(&game.source)
        .bind(&game.source_url)
        .bind(game.rank)
        .bind(game.created_at)
        .bind(game.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(game.id)
    }

    async fn update_game(&self, id: Uuid, update: &GameUpdate) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE games
            SET top_prizes_remaining = $2,
                total_top_prizes = $3,
                end_date = $4,
                image_url = COALESCE($5, image_url),
                source = COALESCE($6, source),
                source_url = COALESCE($7, source_url),
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(update.top_prizes_remaining)
        .bind(update.total_top_prizes)
        .bind(&update.end_date)
        .bind(&update.image_url)
        .bind(&update.source)
        .bind(&update.source_url)
        .bind(update.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("game {} disappeared before update", id);
        }
        Ok(())
    }

    async fn append_import_log(&self, entry: &ImportLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO import_logs
            (id, source_url, content_hash, status, records_processed, records_inserted,
             records_updated, records_failed, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.source_url)
        .bind(&entry.content_hash)
        .bind(entry.status.as_str())
        .bind(entry.records_processed as i32)
        .bind(entry.records_inserted as i32)
        .bind(entry.records_updated as i32)
        .bind(entry.records_failed as i32)
        .bind(serde_json::to_value(&entry.details)?)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recompute_ranks(&self) -> Result<()> {
        sqlx::query("SELECT update_game_rankings()")
            .execute(&self.pool)
            .await
            .context("update_game_rankings() failed")?;
        Ok(())
    }

    async fn recent_import_logs(&self, limit: usize) -> Result<Vec<ImportLogEntry>> {
        let rows: Vec<ImportLogRow> = sqlx::query_as(
            r#"
            SELECT id, source_url, content_hash, status, records_processed, records_inserted,
                   records_updated, records_failed, details, created_at
            FROM import_logs
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ImportLogEntry::try_from).collect()
    }
}
