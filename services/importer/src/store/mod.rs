//! Persistence for games and the import audit log.

mod memory;
mod postgres;

pub use memory::MemoryGameStore;
pub use postgres::PgGameStore;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::model::{GameRecord, GameUpdate, ImportLogEntry, NaturalKey, ParsedRow};

#[async_trait]
pub trait GameStore: Send + Sync {
    /// All games matching the natural key, oldest first.
    async fn find_by_natural_key(&self, key: &NaturalKey) -> Result<Vec<GameRecord>>;

    async fn insert_game(&self, row: &ParsedRow) -> Result<Uuid>;

    async fn update_game(&self, id: Uuid, update: &GameUpdate) -> Result<()>;

    async fn append_import_log(&self, entry: &ImportLogEntry) -> Result<()>;

    /// Run the ranking recompute procedure over all games.
    async fn recompute_ranks(&self) -> Result<()>;

    /// Most recent audit entries, newest first.
    async fn recent_import_logs(&self, limit: usize) -> Result<Vec<ImportLogEntry>>;
}
