use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("recipe_gateway_requests_total", "Total number of gated requests").unwrap();
    pub static ref REQUESTS_ADMITTED: Counter =
        register_counter!("recipe_gateway_requests_admitted_total", "Requests admitted by the rate limiter").unwrap();
    pub static ref REQUESTS_DENIED: Counter =
        register_counter!("recipe_gateway_requests_denied_total", "Requests rejected by the rate limiter").unwrap();
    pub static ref LEDGER_FAILURES: Counter =
        register_counter!("recipe_gateway_ledger_failures_total", "Usage records that could not be written").unwrap();
    pub static ref RECORDED_COST: Counter =
        register_counter!("recipe_gateway_recorded_cost_usd_total", "Upstream cost written to the ledger, in USD").unwrap();
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "recipe_gateway_upstream_latency_seconds",
        "Upstream parser latency in seconds"
    )
    .unwrap();
    pub static ref QUOTA_ENTRIES: Gauge =
        register_gauge!("recipe_gateway_quota_entries", "Client keys currently tracked by the rate limiter").unwrap();
}
