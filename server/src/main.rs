// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! `forgebased`: binds the HTTP API and runs the orchestration engine's poll
//! loop in the same process, shutting both down on the same signal.

use clap::Parser;
use tokio_util::sync::CancellationToken;

use orchestrator_server::config::Config;
use orchestrator_server::{http, state};

/// Forgebase orchestration engine daemon. Most settings are environment
/// variables (`DB_DRIVER`, `ORCH_POLL_INTERVAL`, `LOG_LEVEL`, ...); these
/// flags exist for the handful an operator typically wants at the command
/// line instead.
#[derive(Debug, Parser)]
#[command(name = "forgebased", version, about = "Forgebase orchestration engine daemon")]
struct Cli {
    /// Overrides HTTP_HOST/HTTP_PORT, e.g. "0.0.0.0:9090".
    #[arg(long, env = "HTTP_BIND")]
    bind: Option<String>,

    /// Overrides LOG_LEVEL (an EnvFilter directive, e.g. "info" or "orchestrator_core=debug").
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Overrides PROVIDERS_DIR.
    #[arg(long, env = "PROVIDERS_DIR")]
    providers_dir: Option<std::path::PathBuf>,
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format.as_str() {
        "json" => fmt().json().with_env_filter(filter).init(),
        "pretty" => fmt().pretty().with_env_filter(filter).init(),
        _ => fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(dir) = &cli.providers_dir {
        config.providers_dir = dir.clone();
    }
    if let Some(bind) = &cli.bind {
        config.bind_addr = bind.parse().map_err(|e| anyhow::anyhow!("invalid --bind '{bind}': {e}"))?;
    }

    init_tracing(&config);
    tracing::info!(driver = config.db_driver.as_str(), bind = %config.bind_addr, providers_dir = %config.providers_dir.display(), "forgebased starting");

    let (app_state, engine) = state::build(&config).await?;

    let shutdown = CancellationToken::new();
    let engine_shutdown = shutdown.clone();
    let engine_task = tokio::spawn(async move {
        engine.run(engine_shutdown).await;
    });

    let app = http::router(app_state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "http listener bound");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    shutdown.cancel();
    if let Err(e) = engine_task.await {
        tracing::warn!(error = %e, "engine task panicked during shutdown");
    }

    Ok(())
}

/// Waits for Ctrl+C or SIGTERM, whichever comes first (teacher's daemon
/// startup does the same).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("failed to install SIGTERM handler").recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
