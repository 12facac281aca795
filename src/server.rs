//! # HTTP Server
//!
//! Read-only endpoint consumed by the history UI:
//!
//! - `GET /history?date=YYYY-MM-DD` returns `[{url, title, last_visit_time}]`
//!   newest first, or `{error, code}` with a non-2xx status.
//! - `GET /health` returns `{status, version}`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::error::HistoryError;
use crate::service::{HistoryService, parse_date};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

pub struct AppState {
    pub service: Arc<HistoryService>,
}

impl AppState {
    pub fn new(service: Arc<HistoryService>) -> Self {
        Self { service }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/history", get(get_history))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(state: Arc<AppState>, addr: &str) -> Result<(), ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    info!("visitscope listening on {}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("visitscope server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for ctrl-c");
    }
}

/// GET /history
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let date = match query.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(raw) => match parse_date(raw) {
            Ok(date) => Some(date),
            Err(err) => return error_response(&err),
        },
        None => None,
    };

    let service = Arc::clone(&state.service);
    match tokio::task::spawn_blocking(move || service.fetch(date)).await {
        Ok(Ok(result)) if result.stores_discovered == 0 => {
            error_response(&HistoryError::NoStoresFound)
        }
        Ok(Ok(result)) => Json(result.records).into_response(),
        Ok(Err(err)) => error_response(&err),
        Err(join_err) => {
            error!(error = %join_err, "history task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal error while reading history".into(),
                    code: "internal".into(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn status_for(err: &HistoryError) -> StatusCode {
    match err {
        HistoryError::UnsupportedPlatform(_) => StatusCode::NOT_IMPLEMENTED,
        HistoryError::NoStoresFound => StatusCode::NOT_FOUND,
        HistoryError::InvalidDate(_) => StatusCode::BAD_REQUEST,
        HistoryError::Aggregate { .. }
        | HistoryError::Access { .. }
        | HistoryError::StoreRead { .. }
        | HistoryError::QueryTimeout { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &HistoryError) -> Response {
    let status = status_for(err);
    if status.is_server_error() {
        error!(category = err.category(), error = %err, "history request failed");
    } else {
        info!(category = err.category(), error = %err, "history request rejected");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.category().to_string(),
        }),
    )
        .into_response()
}
