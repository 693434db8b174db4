use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use super::GameStore;
use crate::model::{GameRecord, GameUpdate, ImportLogEntry, NaturalKey, ParsedRow};

/// In-process store with the same matching rules as the `games` table.
///
/// Writes for selected game numbers can be made to fail, which is how row
/// failure isolation is exercised without a database.
#[derive(Default)]
pub struct MemoryGameStore {
    games: Mutex<Vec<GameRecord>>,
    logs: Mutex<Vec<ImportLogEntry>>,
    failing_games: Mutex<HashSet<String>>,
    fail_log: AtomicBool,
    fail_recompute: AtomicBool,
    recompute_calls: AtomicUsize,
}

impl MemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_games(games: Vec<GameRecord>) -> Self {
        let store = Self::default();
        *store.games.lock().unwrap_or_else(|e| e.into_inner()) = games;
        store
    }

    /// Make every insert and update of `game_number` fail.
    pub fn fail_writes_for(&self, game_number: &str) {
        self.failing_games
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(game_number.to_string());
    }

    pub fn fail_import_log(&self) {
        self.fail_log.store(true, Ordering::SeqCst);
    }

    pub fn fail_recompute(&self) {
        self.fail_recompute.store(true, Ordering::SeqCst);
    }

    pub fn games(&self) -> Vec<GameRecord> {
        self.games.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn logs(&self) -> Vec<ImportLogEntry> {
        self.logs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn recompute_calls(&self) -> usize {
        self.recompute_calls.load(Ordering::SeqCst)
    }

    fn check_writable(&self, game_number: &str) -> Result<()> {
        if self.failing_games.lock().unwrap_or_else(|e| e.into_inner()).contains(game_number) {
            anyhow::bail!("simulated write failure for game {}", game_number);
        }
        Ok(())
    }
}

#[async_trait]
impl GameStore for MemoryGameStore {
    async fn find_by_natural_key(&self, key: &NaturalKey) -> Result<Vec<GameRecord>> {
        let games = self.games.lock().unwrap_or_else(|e| e.into_inner());
        Ok(games
            .iter()
            .filter(|g| {
                g.game_number == key.game_number
                    && g.state == key.state
                    && g.top_prize == key.top_prize
            })
            .cloned()
            .collect())
    }

    async fn insert_game(&self, row: &ParsedRow) -> Result<Uuid> {
        self.check_writable(&row.game_number)?;
        let game = GameRecord::from_parsed(row, Utc::now());
        let id = game.id;
        self.games.lock().unwrap_or_else(|e| e.into_inner()).push(game);
        Ok(id)
    }

    async fn update_game(&self, id: Uuid, update: &GameUpdate) -> Result<()> {
        let mut games = self.games.lock().unwrap_or_else(|e| e.into_inner());
        let game = games
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| anyhow::anyhow!("game {} disappeared before update", id))?;
        self.check_writable(&game.game_number)?;
        game.apply(update);
        Ok(())
    }

    async fn append_import_log(&self, entry: &ImportLogEntry) -> Result<()> {
        if self.fail_log.load(Ordering::SeqCst) {
            anyhow::bail!("simulated import log failure");
        }
        self.logs.lock().unwrap_or_else(|e| e.into_inner()).push(entry.clone());
        Ok(())
    }

    async fn recompute_ranks(&self) -> Result<()> {
        self.recompute_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_recompute.load(Ordering::SeqCst) {
            anyhow::bail!("simulated ranking recompute failure");
        }
        Ok(())
    }

    async fn recent_import_logs(&self, limit: usize) -> Result<Vec<ImportLogEntry>> {
        let logs = self.logs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(logs.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(number: &str, prize: f64) -> ParsedRow {
        ParsedRow {
            line: 2,
            game_number: number.to_string(),
            game_name: "Lucky".to_string(),
            state: "GA".to_string(),
            top_prize: prize,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn lookup_matches_full_natural_key() {
        let store = MemoryGameStore::new();
        store.insert_game(&row("1", 100.0)).await.unwrap();
        store.insert_game(&row("1", 500.0)).await.unwrap();

        let found = store.find_by_natural_key(&row("1", 500.0).natural_key()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].top_prize, 500.0);
        assert_eq!(found[0].rank, 0);

        let none = store.find_by_natural_key(&row("2", 100.0).natural_key()).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn injected_failures_only_hit_selected_games() {
        let store = MemoryGameStore::new();
        store.fail_writes_for("13");
        assert!(store.insert_game(&row("13", 1.0)).await.is_err());
        assert!(store.insert_game(&row("14", 1.0)).await.is_ok());
        assert_eq!(store.games().len(), 1);
    }

    #[tokio::test]
    async fn poisoned_lock_does_not_panic_later_calls() {
        let store = std::sync::Arc::new(MemoryGameStore::new());
        let holder = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.games.lock().unwrap();
            panic!("writer died while holding the lock");
        })
        .join();
        assert!(store.games.is_poisoned());

        assert!(store.games().is_empty());
        store.insert_game(&row("1", 100.0)).await.unwrap();
        assert_eq!(store.games().len(), 1);
    }
}
