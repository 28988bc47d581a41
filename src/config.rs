use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::ledger::{Pricing, PricingTable};

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "recipe-gateway")]
#[command(about = "Rate limiting and usage accounting gateway for the recipe parser")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    // Upstream parser endpoint that admitted requests are forwarded to
    #[arg(short, long, default_value = "http://localhost:3001/parse")]
    pub upstream: String,

    // Model id recorded in the ledger and used for pricing
    #[arg(short, long, default_value = "gpt-4o-mini")]
    pub model: String,

    // Max requests per client per short window
    #[arg(long, default_value_t = 100)]
    pub hourly_limit: u32,

    // Max requests per client per long window
    #[arg(long, default_value_t = 500)]
    pub daily_limit: u32,

    // Short window length in seconds
    #[arg(long, default_value_t = 3600)]
    pub hourly_window: u64,

    // Long window length in seconds
    #[arg(long, default_value_t = 86_400)]
    pub daily_window: u64,

    // How often expired quota entries are dropped, in seconds
    #[arg(long, default_value_t = 300)]
    pub sweep_interval: u64,

    // Where usage records are appended
    #[arg(long, default_value = "logs/api_usage.log")]
    pub ledger_path: PathBuf,

    // USD per million input tokens
    #[arg(long, default_value_t = 0.15)]
    pub input_price_per_million: f64,

    // USD per million output tokens
    #[arg(long, default_value_t = 0.60)]
    pub output_price_per_million: f64,

    // Upstream request timeout in seconds
    #[arg(long, default_value_t = 60)]
    pub upstream_timeout: u64,
}

impl Args {
    pub fn hourly_window(&self) -> Duration {
        Duration::from_secs(self.hourly_window)
    }

    pub fn daily_window(&self) -> Duration {
        Duration::from_secs(self.daily_window)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval.max(1))
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout)
    }

    pub fn pricing(&self) -> PricingTable {
        PricingTable::new(Pricing {
            input_per_million: self.input_price_per_million,
            output_per_million: self.output_price_per_million,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::parse_from(["recipe-gateway"]);
        assert_eq!(args.hourly_limit, 100);
        assert_eq!(args.daily_limit, 500);
        assert_eq!(args.hourly_window(), Duration::from_secs(3600));
        assert_eq!(args.daily_window(), Duration::from_secs(86_400));
        assert_eq!(args.ledger_path, PathBuf::from("logs/api_usage.log"));
        assert_eq!(args.pricing().for_model("gpt-4o-mini").output_per_million, 0.60);
    }

    #[test]
    fn overrides() {
        let args = Args::parse_from([
            "recipe-gateway",
            "--hourly-limit",
            "3",
            "--daily-window",
            "60",
            "--input-price-per-million",
            "2.5",
            "--sweep-interval",
            "0",
        ]);
        assert_eq!(args.hourly_limit, 3);
        assert_eq!(args.daily_window(), Duration::from_secs(60));
        assert_eq!(args.pricing().for_model("any").input_per_million, 2.5);
        assert_eq!(args.sweep_interval(), Duration::from_secs(1));
    }
}
