// Admission control and usage accounting in front of the recipe parser

pub mod client_id;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod metrics;
pub mod middleware;
pub mod rate_limit;
pub mod state;
pub mod stats;

use axum::{
    Router, middleware::from_fn_with_state, routing::{get, post}
};
use std::sync::Arc;

use crate::handlers::{health_handler, metrics_handler, parse_handler, stats_handler};
use crate::state::AppState;

// Build the router. Only the parse route sits behind admission control.
pub fn router(state: Arc<AppState>) -> Router {
    let gated = Router::new()
        .route("/api/parse", post(parse_handler))
        .route_layer(from_fn_with_state(state.clone(), middleware::admission));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/stats", get(stats_handler))
        .merge(gated)
        .with_state(state)
}
