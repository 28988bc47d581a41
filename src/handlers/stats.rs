use axum::http::StatusCode;
use axum::{Json, extract::{Query, State}};
use serde::Deserialize;
use std::sync::Arc;

use crate::state::AppState;
use crate::stats::{StatsSnapshot, aggregate};

const DEFAULT_LOOKBACK_DAYS: u32 = 7;

#[derive(Deserialize)]
pub struct StatsQuery {
    pub days: Option<u32>,
}

pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsSnapshot>, StatusCode> {
    let days = query.days.unwrap_or(DEFAULT_LOOKBACK_DAYS);
    let path = state.ledger.path().to_path_buf();

    let snapshot = tokio::task::spawn_blocking(move || aggregate(&path, days))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "stats task failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(snapshot))
}
