//! HTTP routes of the exporter.

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

use crate::state::{ScrapeError, SharedState};

/// Builds the router for the given state.
pub(crate) fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/metrics", get(handle_metrics))
        .route("/health", get(handle_health))
        .route("/api/snapshot", get(handle_snapshot))
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}

/// Every scrape runs one full collection cycle.
async fn handle_metrics(State(state): State<SharedState>) -> Response {
    let scrape_state = state.clone();
    let result = tokio::task::spawn_blocking(move || scrape_state.scrape()).await;

    match result {
        Ok(Ok(body)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, state.content_type())],
            body,
        )
            .into_response(),
        Ok(Err(e @ ScrapeError::Collection(_))) => {
            warn!(error = %e, "scrape failed");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
        Ok(Err(e)) => {
            error!(error = %e, "scrape failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => {
            error!(error = %e, "scrape panicked in spawn_blocking");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn handle_health() -> &'static str {
    "ok"
}

async fn handle_snapshot(State(state): State<SharedState>) -> Response {
    match state.last() {
        Some(view) => Json(&*view).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "no scrape yet").into_response(),
    }
}
