// crates/portico-daemon/src/main.rs
//
// Binary entrypoint for the Portico front door.
//
// Loads layered configuration, initializes tracing, wires the platform
// service into the RPC server and the REST gateway, then runs until SIGINT
// or SIGTERM and drains both listeners within the shutdown deadline.

use std::path::PathBuf;

use clap::Parser;

use portico_daemon::config::DaemonConfig;
use portico_daemon::telemetry;

/// Portico daemon: serves the platform API over RPC and REST.
#[derive(Parser, Debug)]
#[command(name = "portico-daemon", version = "0.1.0", about = "Portico front door daemon")]
struct Args {
    /// Directory holding config.toml and config.{ENV}.toml.
    #[arg(long, default_value = "configs")]
    config_dir: PathBuf,

    /// Override the RPC listen address.
    #[arg(long)]
    grpc_addr: Option<String>,

    /// Override the REST gateway listen address.
    #[arg(long)]
    http_addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // ---------------------------------------------------------------
    // Configuration: files, then environment, then flags.
    // ---------------------------------------------------------------
    let env = std::env::var("ENV").ok();
    let (mut config, sources) = DaemonConfig::load(&args.config_dir, env.as_deref())?;
    config.apply_env(|key| std::env::var(key).ok())?;
    if let Some(addr) = args.grpc_addr {
        config.server.grpc.addr = addr;
    }
    if let Some(addr) = args.http_addr {
        config.server.http.addr = addr;
    }
    config.validate()?;

    telemetry::init_tracing(&config.log);

    tracing::info!("Portico daemon v{}", env!("CARGO_PKG_VERSION"));
    if sources.is_empty() {
        tracing::warn!(
            "No config files found in {}. Using defaults.",
            args.config_dir.display()
        );
    }
    for source in &sources {
        tracing::info!("Loaded configuration from {}", source.display());
    }
    tracing::info!("Storage backend: {}", config.storage.backend);

    // ---------------------------------------------------------------
    // Composition and startup.
    // ---------------------------------------------------------------
    let mut coordinator = portico_daemon::build(&config)?;
    let endpoints = match coordinator.start().await {
        Ok(endpoints) => endpoints,
        Err(e) => {
            tracing::error!("Startup failed: {}", e);
            coordinator.stop(config.shutdown_timeout()).await;
            return Err(e.into());
        }
    };
    tracing::info!("RPC endpoint: {}", endpoints.rpc);
    tracing::info!("REST endpoint: http://{}{}", endpoints.http, config.server.http.prefix);

    shutdown_signal().await;

    let report = coordinator.stop(config.shutdown_timeout()).await;
    if report.is_clean() {
        tracing::info!("Portico daemon stopped cleanly");
    } else {
        tracing::warn!(
            "Portico daemon stopped with abandoned work: gateway={:?}, rpc={:?}",
            report.gateway,
            report.rpc
        );
    }
    Ok(())
}

/// Resolve on Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
