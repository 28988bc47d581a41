mod health;
mod metrics;
mod parse;
mod stats;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use parse::parse_handler;
pub use stats::stats_handler;
