//! Binary entrypoint: parse CLI flags, load configuration, bootstrap the
//! engine, and serve the five HTTP endpoints (`spec.md §6.1`).

use std::io;
use std::time::Duration;

use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use hearth_server::config::Cli;
use hearth_server::state::AppState;
use hearth_server::{bootstrap, config, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();

    let cli = Cli::parse();
    let hearth_config = config::load(&cli)?;
    let bind_addr = hearth_config.bind_addr;

    let (engine, probes) = bootstrap::build_engine(&hearth_config)?;
    for probe in &probes {
        if probe.healthy {
            tracing::info!(probe = %probe.name, "startup probe passed");
        } else {
            tracing::warn!(probe = %probe.name, detail = ?probe.detail, "startup probe failed");
        }
    }

    let app_state = AppState::new(engine, hearth_config, probes);
    let app = routes::router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(30)));

    tracing::info!(%bind_addr, "hearth-server listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Tracing to stderr, `RUST_LOG`-driven with a sane default.
fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
