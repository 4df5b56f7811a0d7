//! Read-Only Query Surface
//!
//! Four routes besides the WebSocket upgrade: a status probe, the
//! latest reading, paginated history, and trailing-window statistics.
//! Database failures surface as a 500 with an `error` body; clients
//! only ever distinguish "worked" from "didn't".

use crate::{context::AppContext, live, store::{ReadingRow, StatisticsRow}};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tracing::error;

/// Failures a query handler can surface
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("{self}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

/// Build the dashboard API router
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/data/latest", get(latest))
        .route("/api/data/history", get(history))
        .route("/api/data/statistics", get(statistics))
        .route("/ws", get(live::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    mqtt: bool,
    database: bool,
    clients: usize,
    uptime: f64,
}

async fn status(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "online",
        mqtt: ctx.link.mqtt_up(),
        database: ctx.link.database_up(),
        clients: ctx.hub.client_count(),
        uptime: ctx.uptime_seconds(),
    })
}

/// Latest reading, or an empty object before the first one lands
async fn latest(State(ctx): State<AppContext>) -> Result<Json<Value>, ApiError> {
    let row = ctx.store.latest().await?;
    let body = row
        .and_then(|r| serde_json::to_value(r).ok())
        .unwrap_or_else(|| json!({}));
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
    device_id: Option<String>,
}

fn default_limit() -> i64 {
    100
}

async fn history(
    State(ctx): State<AppContext>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<ReadingRow>>, ApiError> {
    let rows = ctx
        .store
        .history(params.limit, params.offset, params.device_id.as_deref())
        .await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
struct StatsParams {
    #[serde(default = "default_hours")]
    hours: f64,
    device_id: Option<String>,
}

fn default_hours() -> f64 {
    24.0
}

async fn statistics(
    State(ctx): State<AppContext>,
    Query(params): Query<StatsParams>,
) -> Result<Json<StatisticsRow>, ApiError> {
    let row = ctx
        .store
        .statistics(params.hours, params.device_id.as_deref())
        .await?;
    Ok(Json(row))
}
