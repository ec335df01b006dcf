//! HTTP facade over the federated search engine

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{SearchCriteria, SearchOutcome, SharedEngine};

/// Search request body
#[derive(Debug, Deserialize)]
pub struct SearchRequestHttp {
    pub criteria: SearchCriteria,
    /// Directories to query; all active directories when omitted
    #[serde(default)]
    pub directory_ids: Option<Vec<String>>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub directories: usize,
}

/// Public view of a configured directory; credentials are never exposed
#[derive(Debug, Serialize)]
pub struct DirectoryInfo {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub base_dn: String,
    pub service_url: String,
    pub auth: &'static str,
    pub request_timeout_ms: u64,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

async fn search_handler(
    State(engine): State<SharedEngine>,
    Json(req): Json<SearchRequestHttp>,
) -> Result<Json<SearchOutcome>, HandlerError> {
    let directory_ids = req.directory_ids.unwrap_or_else(|| {
        engine
            .list_directories()
            .into_iter()
            .map(|d| d.id.clone())
            .collect()
    });
    info!(
        "Received search request: scope={:?}, directories={:?}",
        req.criteria.scope, directory_ids
    );

    match engine.search(&req.criteria, &directory_ids).await {
        Ok(outcome) => {
            info!(
                "Search finished with {}: {} entities",
                outcome.code,
                outcome.entities.len()
            );
            Ok(Json(outcome))
        }
        Err(e) => {
            error!("Rejected search request: {}", e);
            Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "Invalid search criteria".to_string(),
                    details: Some(e.to_string()),
                }),
            ))
        }
    }
}

async fn ping_handler(
    State(engine): State<SharedEngine>,
    Path(id): Path<String>,
) -> Result<Json<SearchOutcome>, HandlerError> {
    if engine.get_directory(&id).is_none() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Unknown directory".to_string(),
                details: Some(id),
            }),
        ));
    }

    engine.ping_directory(&id).await.map(Json).map_err(|e| {
        error!("Ping of {} failed: {}", id, e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Ping failed".to_string(),
                details: Some(e.to_string()),
            }),
        )
    })
}

async fn directories_handler(State(engine): State<SharedEngine>) -> Json<Vec<DirectoryInfo>> {
    let default_timeout = engine.config().default_request_timeout();
    Json(
        engine
            .list_directories()
            .into_iter()
            .map(|d| DirectoryInfo {
                id: d.id.clone(),
                name: d.name.clone(),
                description: d.description.clone(),
                base_dn: d.base_dn.clone(),
                service_url: d.service_url.clone(),
                auth: d.auth.label(),
                request_timeout_ms: u64::try_from(d.read_timeout(default_timeout).as_millis()).unwrap_or(u64::MAX),
            })
            .collect(),
    )
}

async fn health_handler(State(engine): State<SharedEngine>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "hpd-federator".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        directories: engine.list_directories().len(),
    })
}

/// Create and configure the HTTP server
pub fn create_router(engine: SharedEngine) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/directories", get(directories_handler))
        .route("/directories/:id/ping", post(ping_handler))
        .route("/search", post(search_handler))
        .with_state(engine)
}

/// Run the HTTP server
pub async fn run_server(engine: SharedEngine, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    info!("Starting HPD federator on {}", addr);

    let app = create_router(engine);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
