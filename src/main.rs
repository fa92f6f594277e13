//! Mapping gateway.
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ routing (flatten + match) ──▶ proxy pipeline
//!                                                                     │
//!                                             cache lookup / populate ┤
//!                                                                     ▼
//!     Client Response ◀────────────────────── transform ◀──────── backend / stub
//!
//!     mapping sources (config inline, watched directory) ──▶ mapping registry
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use mapping_gateway::config::{load_or_default, MappingDirectory, MappingWatcher};
use mapping_gateway::observability::{logging, metrics};
use mapping_gateway::{HttpServer, MappingRegistry};

#[derive(Parser)]
#[command(name = "mapping-gateway")]
#[command(about = "HTTP gateway driven by declarative request mappings", long_about = None)]
struct Cli {
    /// Path to the gateway configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway (default)
    Serve,
    /// Validate the configuration and mapping files, then exit
    Check,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_or_default(&cli.config)?;

    logging::init(&config.observability.log_level);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Check => check(&config),
        Commands::Serve => serve(config).await,
    }
}

async fn serve(config: mapping_gateway::GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("mapping-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        cache = ?config.cache.kind,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let registry = Arc::new(MappingRegistry::new());
    if !config.mappings.inline.is_empty() {
        registry.register(config.mappings.inline.clone())?;
    }

    // Held for the lifetime of the server; dropping it stops the watcher.
    let _watcher = match &config.mappings.directory {
        Some(directory) => {
            let source = MappingDirectory::new(directory, registry.clone());
            let poll = Duration::from_secs(config.mappings.poll_interval_secs);
            Some(MappingWatcher::new(source, poll).run()?)
        }
        None => None,
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        mappings = registry.len(),
        "Listening for connections"
    );

    let server = HttpServer::new(&config, registry);
    server.run(listener, shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn check(config: &mapping_gateway::GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("configuration ok ({} inline mappings)", config.mappings.inline.len());

    let Some(directory) = &config.mappings.directory else {
        return Ok(());
    };
    let mut source = MappingDirectory::new(directory, Arc::new(MappingRegistry::new()));
    let report = source.sync()?;
    println!(
        "{}: {} mappings compiled",
        directory.display(),
        report.registered.len()
    );
    if report.failed.is_empty() {
        return Ok(());
    }
    for path in &report.failed {
        eprintln!("invalid mapping file: {}", path.display());
    }
    Err(format!("{} mapping files failed to load", report.failed.len()).into())
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
