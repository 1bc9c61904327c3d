//! HTTP API layer.
//!
//! Thin axum wrapper over the orchestrator: one ask endpoint, one health
//! endpoint, request tracing middleware, cooperative shutdown.

use crate::config::Config;
use crate::error::AskError;
use crate::llm::{self, ChatClient};
use crate::state::Database;
use crate::tools::ToolCatalog;
use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Shared state for request handlers. The catalog and client are immutable
/// after startup; the database sits behind an async mutex.
pub struct AppState {
    pub config: Config,
    pub catalog: ToolCatalog,
    pub client: ChatClient,
    pub db: Arc<Mutex<Database>>,
}

/// Start the API server; returns when `cancel` fires.
pub async fn serve(state: AppState, cancel: CancellationToken) -> Result<()> {
    let addr = state.config.listen_addr.clone();

    let app = Router::new()
        .route("/api/v1/llm/ask", post(ask))
        .route("/api/v1/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    text: String,
}

#[derive(Debug, Serialize)]
struct AskResponse {
    answer: String,
}

async fn ask(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let answer = llm::ask_with_tools(
        &state.config,
        &state.catalog,
        &state.client,
        &state.db,
        &req.text,
    )
    .await?;

    Ok(Json(AskResponse { answer }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "hwmetrics",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// API error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Maps the ask-pipeline error taxonomy onto HTTP statuses: transport
/// failures surface as 502, everything else as 500.
struct ApiError(AskError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_transport() {
            StatusCode::BAD_GATEWAY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        tracing::error!("ask request failed: {}", self.0);

        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<AskError> for ApiError {
    fn from(err: AskError) -> Self {
        Self(err)
    }
}
