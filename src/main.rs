use toolscout::cli::{self, Cli, Commands};
use toolscout::config::{Config, LogFormat};
use toolscout::embeddings::provider_from_config;
use toolscout::handlers;
use toolscout::protocol::DiscoveryService;
use toolscout::state::AppState;

use anyhow::Context;
use axum::routing::get;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    cli.apply_overrides(&mut config);

    init_tracing(config.log_format);

    match &cli.command {
        Commands::Serve { .. } => serve(config).await,
        Commands::Index => cli::run_index(&config).await,
        Commands::Tools { json } => cli::run_tools(&config, *json),
        Commands::Migrate { action } => cli::run_migrate(&config, *action),
        Commands::Retire { name } => cli::run_retire(&config, name),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "toolscout=info,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting toolscout discovery service");

    let shutdown_timeout = config.shutdown_timeout_secs;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    // Set up Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    let start = std::time::Instant::now();

    // Any of these failing aborts start-up: invalid tool, bad credentials,
    // unreachable or unmigrated store.
    let registry = cli::build_registry()?;
    let provider =
        provider_from_config(&config.embedding).context("failed to create embedding provider")?;
    let store = cli::open_store(&config)?;

    if provider.dimensions() != store.dimensions() {
        anyhow::bail!(
            "embedding provider returns {} dimensions but the store expects {}",
            provider.dimensions(),
            store.dimensions()
        );
    }

    let service = DiscoveryService::new(
        provider,
        Arc::new(store.clone()),
        registry,
        config.request_timeout(),
    );
    let state = Arc::new(AppState::new(service, store));
    state.mark_ready();

    tracing::info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        "State initialized",
    );

    let app = handlers::router(state).route(
        "/metrics",
        get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_timeout))
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
/// After signal, allows `timeout_secs` for in-flight requests to complete.
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }

    tracing::info!(timeout_secs, "Draining connections...");
    tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
}
