//! On-demand HTTP trigger.
//!
//! | Route | Method | Response |
//! |-------|--------|----------|
//! | `/health` | GET | `{"status": "ok"}` |
//! | `/price-units` | GET, POST | [`RunResponse`], 200 or 500 |
//!
//! Runs triggered here are bounded by the same execution budget as the
//! scheduled run.

use crate::output::RunResponse;
use crate::run::Pipeline;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Build the router around a shared pipeline.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/price-units", get(trigger_run).post(trigger_run))
        .with_state(pipeline)
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until the process is stopped.
pub async fn serve(pipeline: Arc<Pipeline>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP trigger listening on http://{}", listener.local_addr()?);
    info!("  GET  /health");
    info!("  POST /price-units");
    axum::serve(listener, router(pipeline)).await
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn trigger_run(State(pipeline): State<Arc<Pipeline>>) -> impl IntoResponse {
    info!("Manual run requested");
    let result = pipeline.run_with_timeout().await;
    if let Err(e) = &result {
        error!("Manual run failed: {}", e);
    }
    let response = RunResponse::from_result(&result);
    let status =
        StatusCode::from_u16(response.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response))
}
