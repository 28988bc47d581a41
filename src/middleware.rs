use axum::Json;
use axum::extract::{Request, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use std::sync::Arc;

use crate::client_id::identify;
use crate::metrics::{REQUEST_TOTAL, REQUESTS_ADMITTED, REQUESTS_DENIED};
use crate::rate_limit::AdmitOutcome;
use crate::state::AppState;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";
pub const DAILY_REMAINING_HEADER: &str = "x-ratelimit-daily-remaining";
pub const DAILY_RESET_HEADER: &str = "x-ratelimit-daily-reset";

// Admission control in front of the protected routes.
// Admitted requests carry their ClientKey in the request extensions.
pub async fn admission(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    REQUEST_TOTAL.inc();

    let key = identify(req.headers());
    let outcome = state
        .rate_limiter
        .admit(&key, state.hourly_limit, state.daily_limit);

    if !outcome.allowed {
        REQUESTS_DENIED.inc();
        tracing::debug!(client = %key, reset = %outcome.short_reset_at, "rate limit exceeded");

        let body = Json(serde_json::json!({
            "error": "Rate limit exceeded. Please try again later.",
            "resetTime": outcome.short_reset_at,
            "dailyResetTime": outcome.long_reset_at,
        }));
        let mut res = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
        stamp_headers(res.headers_mut(), &outcome, state.hourly_limit);

        // Retry once every exhausted window has reset
        let reset_at = match (outcome.short_remaining, outcome.long_remaining) {
            (0, 0) => outcome.short_reset_at.max(outcome.long_reset_at),
            (0, _) => outcome.short_reset_at,
            _ => outcome.long_reset_at,
        };
        let wait = (reset_at - Utc::now()).num_seconds().max(0);
        res.headers_mut().insert(RETRY_AFTER, HeaderValue::from(wait));
        return res;
    }

    REQUESTS_ADMITTED.inc();
    tracing::debug!(
        client = %key,
        remaining = outcome.short_remaining,
        daily_remaining = outcome.long_remaining,
        "request admitted"
    );

    req.extensions_mut().insert(key);
    let mut res = next.run(req).await;
    stamp_headers(res.headers_mut(), &outcome, state.hourly_limit);
    res
}

fn stamp_headers(headers: &mut HeaderMap, outcome: &AdmitOutcome, limit: u32) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(outcome.short_remaining));
    headers.insert(DAILY_REMAINING_HEADER, HeaderValue::from(outcome.long_remaining));
    if let Ok(v) = HeaderValue::from_str(&outcome.short_reset_at.to_rfc3339()) {
        headers.insert(RESET_HEADER, v);
    }
    if let Ok(v) = HeaderValue::from_str(&outcome.long_reset_at.to_rfc3339()) {
        headers.insert(DAILY_RESET_HEADER, v);
    }
}
