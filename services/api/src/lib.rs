//! HTTP surface for the CSV importer.
//!
//! Endpoints:
//! - GET  /health - Health check
//! - POST /import-csv - Run one import (`{ csvUrl, offset?, limit?, dryRun?, columnMapping? }`)
//! - GET  /import-logs - Recent import audit entries
//!
//! CORS preflight is answered by the permissive CORS layer.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use importer::config::Config;
use importer::fetch::SourceLocator;
use importer::object_store::ObjectStore;
use importer::store::GameStore;
use importer::{import_history, ImportRequest, Importer};

// ============================================================================
// State
// ============================================================================

pub struct AppState {
    pub config: Config,
    pub client: reqwest::Client,
    pub objects: Arc<dyn ObjectStore>,
    pub store: Arc<dyn GameStore>,
    in_flight: Mutex<HashSet<String>>,
}

impl AppState {
    pub fn new(
        config: Config,
        client: reqwest::Client,
        objects: Arc<dyn ObjectStore>,
        store: Arc<dyn GameStore>,
    ) -> Self {
        Self {
            config,
            client,
            objects,
            store,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Single-flight key for a request: the resolved locator, so a public
    /// storage URL and its `storage://` form count as the same source.
    fn claim_key(&self, csv_url: &str) -> importer::Result<String> {
        let prefix = self.config.public_object_prefix();
        SourceLocator::resolve(csv_url, prefix.as_deref()).map(|locator| locator.to_string())
    }

    /// Claim `source` for the duration of one import, or `None` if another
    /// import of the same source is still running.
    fn claim(&self, source: &str) -> Option<InFlight<'_>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(source.to_string()) {
            return None;
        }
        Some(InFlight {
            set: &self.in_flight,
            source: source.to_string(),
        })
    }
}

/// Releases a claimed source when dropped, including on early return.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    source: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.source);
    }
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct FailureResponse {
    pub status: String,
    pub error: String,
}

fn failure(code: StatusCode, error: impl Into<String>) -> Response {
    (
        code,
        Json(FailureResponse {
            status: "failed".to_string(),
            error: error.into(),
        }),
    )
        .into_response()
}

#[derive(Deserialize)]
struct LogsQuery {
    limit: Option<usize>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn import_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ImportRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return failure(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    let source = request.csv_url.trim().to_string();
    if source.is_empty() {
        return failure(StatusCode::BAD_REQUEST, "csvUrl is required");
    }

    let key = match state.claim_key(&source) {
        Ok(key) => key,
        Err(e) => {
            error!(source = %source, "Import failed: {}", e);
            return failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };
    let Some(_claim) = state.claim(&key) else {
        return failure(
            StatusCode::CONFLICT,
            format!("An import of {} is already running", source),
        );
    };

    info!(source = %source, dry_run = request.dry_run, "Import requested");
    let importer = Importer::new(
        &state.client,
        state.objects.as_ref(),
        state.store.as_ref(),
        &state.config,
    );
    match importer.run(&request).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            error!(source = %source, "Import failed: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn import_logs_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogsQuery>,
) -> Response {
    match import_history(state.store.as_ref(), params.limit).await {
        Ok(logs) => Json(serde_json::json!({ "logs": logs })).into_response(),
        Err(e) => {
            error!("Failed to read import logs: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/import-csv", post(import_handler))
        .route("/import-logs", get(import_logs_handler))
        .layer(cors)
        .with_state(state)
}
