//! HTTP surface using axum.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use updown_telemetry::Metrics;

use crate::config::DashboardConfig;
use crate::error::{DashboardError, DashboardResult};
use crate::state::DashboardState;
use crate::types::{KillSwitchRequest, KillSwitchResponse, PaperTrade, StatusSnapshot};

/// Reason recorded when an operator engages without giving one.
const DEFAULT_KILL_REASON: &str = "manual";

pub fn create_router(state: DashboardState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .route("/paper-trades", get(paper_trades))
        .route("/admin/kill-switch", get(get_kill_switch).post(set_kill_switch))
        .route("/metrics", get(metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn status(State(state): State<DashboardState>) -> Json<StatusSnapshot> {
    Json(state.snapshot(Utc::now().timestamp_millis()))
}

async fn paper_trades(State(state): State<DashboardState>) -> Json<Vec<PaperTrade>> {
    Json(state.paper_trades())
}

async fn get_kill_switch(State(state): State<DashboardState>) -> Json<KillSwitchResponse> {
    Json(state.kill_switch().status().into())
}

async fn set_kill_switch(
    State(state): State<DashboardState>,
    Json(request): Json<KillSwitchRequest>,
) -> Json<KillSwitchResponse> {
    let kill_switch = state.kill_switch();
    if request.enabled {
        let reason = request
            .reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_KILL_REASON.to_string());
        kill_switch.engage(reason);
    } else if kill_switch.clear() {
        warn!("Kill switch cleared via admin endpoint");
    }
    Json(kill_switch.status().into())
}

async fn metrics() -> Response {
    match Metrics::gather_text() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
        }
    }
}

/// Serve until `shutdown` is cancelled.
pub async fn run_server(
    state: DashboardState,
    config: DashboardConfig,
    shutdown: CancellationToken,
) -> DashboardResult<()> {
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| DashboardError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(%addr, "Starting dashboard server");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Dashboard server stopped");
    Ok(())
}
