use clap::Parser; // for cli
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use recipe_gateway::config::Args;
use recipe_gateway::rate_limit::run_sweeper;
use recipe_gateway::router;
use recipe_gateway::state::AppState;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // parse cli arguments
    let args = Args::parse();

    let state = match AppState::from_args(&args) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!(error = %e, "failed to build upstream client");
            return Err(std::io::Error::other(e));
        }
    };

    // spawn the background quota sweeper
    tokio::spawn(run_sweeper(state.rate_limiter.clone(), args.sweep_interval()));

    let app = router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(port = args.port, "gateway listening");
    tracing::info!(upstream = %args.upstream, model = %args.model, "forwarding admitted requests");
    tracing::info!(
        hourly = args.hourly_limit,
        hourly_window_secs = args.hourly_window,
        daily = args.daily_limit,
        daily_window_secs = args.daily_window,
        "rate limits"
    );
    tracing::info!(ledger = %args.ledger_path.display(), "usage ledger");

    axum::serve(listener, app).await
}
