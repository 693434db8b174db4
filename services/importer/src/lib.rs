//! Scratch-off game CSV importer.
//!
//! A run fetches a CSV (from our own object storage or any URL), maps its
//! columns onto the canonical game shape, and upserts each row into the
//! `games` table by natural key (`game_number`, `state`, `top_prize`).
//! The outcome is written to `import_logs` and triggers a ranking recompute.

pub mod columns;
pub mod config;
pub mod error;
pub mod fetch;
pub mod model;
pub mod object_store;
pub mod parse;
pub mod pipeline;
pub mod reconcile;
pub mod store;

pub use error::{ImportError, Result};
pub use model::{ImportResult, ImportStatus, ParsedRow};
pub use pipeline::{import_history, ImportRequest, Importer};

/// Shared HTTP client settings for CSV downloads.
pub fn http_client(config: &config::Config) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.fetch_timeout_secs))
        .user_agent(concat!("ScratchoffImporter/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}
