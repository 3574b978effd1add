use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

mod config;
mod handlers;
mod logging;
mod metrics;
mod middleware;
mod probes;
mod server;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Runs one full, serialized collection per scrape.
    pub collector: Arc<metrics::Collector>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = config::Args::parse();

    // ── 1. Logging ──────────────────────────────────────────────
    let _log_guard = logging::init(&args.log_level, args.log_file.as_deref())?;
    info!(version = env!("CARGO_PKG_VERSION"), "homelab exporter starting up");

    // ── 2. Configuration ────────────────────────────────────────
    let collector_config = args.collector_config()?;

    // ── 3. Build shared state ───────────────────────────────────
    let system = Arc::new(probes::SystemProbes::new(args.du_sudo));
    let collector = metrics::Collector::new(
        collector_config,
        system.clone(),
        system,
        Arc::new(probes::PingProbe),
        Arc::new(probes::SpeedtestCli::new(&args.speedtest_command)),
    );
    let config = collector.config();
    info!(
        root = %config.root_path.display(),
        services = config.services.len(),
        speedtest_interval_secs = config.speedtest_interval.as_secs(),
        "collector configured"
    );
    let state = Arc::new(AppState {
        collector: Arc::new(collector),
    });

    // ── 4. Build Axum router ────────────────────────────────────
    let app = server::create_router(state);

    // ── 5. Bind & serve ─────────────────────────────────────────
    let addr = args.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!("metrics server listening on http://{addr}/metrics");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")?;

    info!("homelab exporter stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
