use std::sync::Arc;

use crate::config::Args;
use crate::ledger::{PricingTable, UsageLedger};
use crate::rate_limit::RateLimiter;

// app's shared state
pub struct AppState {
    pub client: reqwest::Client,
    pub upstream_url: String,
    pub model: String,
    pub rate_limiter: Arc<RateLimiter>,
    pub hourly_limit: u32, // max requests per short window
    pub daily_limit: u32,  // max requests per long window
    pub ledger: Arc<UsageLedger>,
    pub pricing: PricingTable,
}

impl AppState {
    pub fn from_args(args: &Args) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(args.upstream_timeout())
            .build()?;

        Ok(Self {
            client,
            upstream_url: args.upstream.clone(),
            model: args.model.clone(),
            rate_limiter: Arc::new(RateLimiter::new(args.hourly_window(), args.daily_window())),
            hourly_limit: args.hourly_limit,
            daily_limit: args.daily_limit,
            ledger: Arc::new(UsageLedger::new(args.ledger_path.clone())),
            pricing: args.pricing(),
        })
    }
}
