//! Importer CLI - runs one CSV import against the games table
//!
//! Usage:
//!   # External URL:
//!   cargo run --bin importer -- --csv-url https://example.org/scratchers.csv
//!
//!   # File in our own storage, first 200 rows only, no writes:
//!   cargo run --bin importer -- --csv-url storage://csv-imports/ga.csv --limit 200 --dry-run
//!
//!   # Header the rules don't recognise:
//!   cargo run --bin importer -- --csv-url ... --map "Jurisdiction=state"

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use importer::columns::{ColumnOverrides, Field};
use importer::config::Config;
use importer::store::PgGameStore;
use importer::{object_store, ImportRequest, ImportStatus, Importer};

#[derive(Parser, Debug)]
#[command(name = "importer", about = "Imports scratch-off game data from a CSV file")]
struct Args {
    /// CSV location: http(s) URL, own-storage public URL, or storage://bucket/path
    #[arg(long)]
    csv_url: String,

    /// Parsed rows to skip before importing
    #[arg(long, default_value_t = 0)]
    offset: usize,

    /// Maximum number of parsed rows to import
    #[arg(long)]
    limit: Option<usize>,

    /// Dry run - look up rows but don't write to the database
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Column override as HEADER=FIELD (repeatable)
    #[arg(long = "map", value_parser = parse_mapping)]
    mappings: Vec<(String, Field)>,

    /// Print the full result as JSON
    #[arg(long, default_value = "false")]
    json: bool,
}

fn parse_mapping(raw: &str) -> Result<(String, Field), String> {
    let (header, field) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected HEADER=FIELD, got '{}'", raw))?;
    Ok((header.trim().to_string(), field.parse()?))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;

    println!("=== Scratch-off CSV Importer ===");
    println!("Source: {}", args.csv_url);
    println!("Mode: {}", if args.dry_run { "dry-run" } else { "live" });

    let client = importer::http_client(&config)?;
    let objects = object_store::from_config(&config, client.clone())?;
    let store = PgGameStore::connect(config.require_db_url()?, 5).await?;

    let request = ImportRequest {
        csv_url: args.csv_url.clone(),
        offset: args.offset,
        limit: args.limit,
        dry_run: args.dry_run,
        column_mapping: args.mappings.into_iter().collect::<ColumnOverrides>(),
    };

    let result = Importer::new(&client, objects.as_ref(), &store, &config)
        .run(&request)
        .await
        .context("Import failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    println!("\n=== Import Summary ===");
    println!("Status:    {}", result.status.as_str());
    println!("Processed: {}", result.records_processed);
    println!("Inserted:  {}", result.records_inserted);
    println!("Updated:   {}", result.records_updated);
    println!("Failed:    {}", result.records_failed);
    for failed in result.details.failed.iter().take(5) {
        println!("  line {}: {}", failed.row, failed.error);
    }
    if result.details.failed.len() > 5 {
        println!("  ... and {} more", result.details.failed.len() - 5);
    }

    if result.status == ImportStatus::Failed {
        anyhow::bail!("Every row failed to import");
    }
    Ok(())
}
