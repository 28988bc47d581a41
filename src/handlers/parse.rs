use axum::http::HeaderMap;
use axum::{Extension, Json, extract::State};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use crate::client_id::ClientKey;
use crate::error::UpstreamError;
use crate::ledger::{InputType, UsageRecord};
use crate::metrics::UPSTREAM_LATENCY;
use crate::state::AppState;

pub const COUNTRY_HEADER: &str = "x-vercel-ip-country";

// Forward an admitted request to the upstream parser, then write its usage to the ledger
pub async fn parse_handler(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<ClientKey>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, UpstreamError> {
    let start_time = Instant::now();
    let result = call_upstream(&state, &payload).await;
    UPSTREAM_LATENCY.observe(start_time.elapsed().as_secs_f64());

    let pricing = state.pricing.for_model(&state.model);
    let mut record = match &result {
        Ok(body) => {
            let (input_tokens, output_tokens) = token_usage(body);
            let mut record =
                UsageRecord::new(&client, &state.model, input_tokens, output_tokens, &pricing, true);
            record.recipe_name = body
                .get("recipeName")
                .and_then(Value::as_str)
                .map(str::to_string);
            record.ingredient_count = ingredient_count(body);
            record
        }
        Err(e) => {
            tracing::error!(client = %client, error = %e, "upstream parse failed");
            let mut record = UsageRecord::new(&client, &state.model, 0, 0, &pricing, false);
            record.error = Some(e.category());
            record
        }
    };
    record.input_type = payload
        .get("input")
        .and_then(Value::as_str)
        .map(InputType::detect);
    record.country = headers
        .get(COUNTRY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    // File I/O stays off the async workers
    let ledger = Arc::clone(&state.ledger);
    if let Err(e) = tokio::task::spawn_blocking(move || ledger.append(&record)).await {
        tracing::error!(error = %e, "usage ledger task failed");
    }

    result.map(Json)
}

async fn call_upstream(state: &AppState, payload: &Value) -> Result<Value, UpstreamError> {
    let res = state
        .client
        .post(&state.upstream_url)
        .json(payload)
        .send()
        .await
        .map_err(UpstreamError::Unreachable)?;

    let status = res.status();
    if !status.is_success() {
        return Err(UpstreamError::Status(status.as_u16()));
    }

    res.json::<Value>().await.map_err(UpstreamError::InvalidBody)
}

fn ingredient_count(body: &Value) -> Option<u32> {
    body.get("ingredients")
        .and_then(Value::as_array)
        .map(|items| u32::try_from(items.len()).unwrap_or(u32::MAX))
}

// OpenAI-style (prompt/completion) or Anthropic-style (input/output) usage block
fn token_usage(body: &Value) -> (u64, u64) {
    let Some(usage) = body.get("usage") else {
        return (0, 0);
    };
    let field = |a: &str, b: &str| {
        usage
            .get(a)
            .or_else(|| usage.get(b))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };
    (
        field("prompt_tokens", "input_tokens"),
        field("completion_tokens", "output_tokens"),
    )
}
