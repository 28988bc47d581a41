use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not serialize usage record: {0}")]
    Serialize(#[from] serde_json::Error),
}

// Upstream parser failures - recorded in the ledger, then surfaced as 502
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("upstream returned an unreadable body: {0}")]
    InvalidBody(#[source] reqwest::Error),
}

impl UpstreamError {
    // Short category string stored in the ledger's `error` field
    pub fn category(&self) -> String {
        match self {
            UpstreamError::Unreachable(_) => "upstream_unreachable".to_string(),
            UpstreamError::Status(code) => format!("upstream_status_{code}"),
            UpstreamError::InvalidBody(_) => "upstream_invalid_body".to_string(),
        }
    }
}

impl IntoResponse for UpstreamError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": "Failed to parse recipe. Please try again.",
            "category": self.category(),
        }));
        (StatusCode::BAD_GATEWAY, body).into_response()
    }
}
