//! dqflow - Main Entry Point
//!
//! Wires the task store, object store, billing ledger, executor registry
//! and catalog together, then serves the task API. All coupling/factory
//! logic lives here, separated from the engine's business logic.

use clap::{Parser, Subcommand};
use dqflow::agents::ExecutorRegistry;
use dqflow::api::http::ApiServer;
use dqflow::api::TaskApi;
use dqflow::billing::InMemoryLedger;
use dqflow::catalog::Catalog;
use dqflow::config::EngineConfig;
use dqflow::observability::{init_default_logging, metrics};
use dqflow::pipeline::PipelineDeps;
use dqflow::retention::RetentionSweeper;
use dqflow::storage::LocalObjectStore;
use dqflow::task::InMemoryTaskStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Task lifecycle and pipeline orchestration engine
#[derive(Parser)]
#[command(name = "dqflow")]
#[command(about = "Task lifecycle and pipeline orchestration engine for data-quality analysis")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the task API server
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Run one retention sweep pass and exit
    Sweep,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting dqflow v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_server(config).await,
        Commands::Config { show } => handle_config_command(config, show),
        Commands::Sweep => run_sweep_once(config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(EngineConfig::load_from_file(path)?)
        }
        None => {
            let default_paths = ["dqflow.toml", "config/dqflow.toml"];
            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(EngineConfig::load_from_file(&path)?);
                }
            }
            info!("No configuration file found; using defaults");
            let config = EngineConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Bootstrap factory: build every dependency and hand them to the engine
async fn build_deps(
    config: &EngineConfig,
) -> Result<PipelineDeps, Box<dyn std::error::Error>> {
    let catalog = match config.catalog.clone() {
        Some(catalog_config) => Arc::new(Catalog::from_config(catalog_config)?),
        None => Arc::new(Catalog::builtin()),
    };

    let executors = Arc::new(ExecutorRegistry::with_builtin());
    executors.validate_covers(&catalog)?;

    let objects = LocalObjectStore::new(config.storage.root.clone(), config.public_base_url());
    objects.init().await?;

    Ok(PipelineDeps {
        tasks: Arc::new(InMemoryTaskStore::new()),
        objects: Arc::new(objects),
        billing: Arc::new(InMemoryLedger::new(
            catalog.price_table(),
            config.billing.starting_credits,
        )),
        executors,
        catalog,
    })
}

async fn run_server(config: EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let collector = metrics();
    collector.set_service_state("initializing");

    let deps = build_deps(&config).await?;

    let api = Arc::new(TaskApi::new(
        deps.clone(),
        chrono::Duration::seconds(config.storage.upload_url_ttl_secs as i64),
        chrono::Duration::seconds(config.storage.download_url_ttl_secs as i64),
    ));

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let server = ApiServer::new(
        api,
        Arc::clone(&deps.objects),
        addr,
        config.storage.max_upload_bytes,
    );

    tokio::spawn(async move {
        server.start().await;
    });

    let sweeper = RetentionSweeper::new(
        Arc::clone(&deps.tasks),
        Arc::clone(&deps.objects),
        chrono::Duration::seconds(config.retention.abandoned_after_secs as i64),
        chrono::Duration::seconds(config.retention.purge_after_secs as i64),
    );
    tokio::spawn(sweeper.run(std::time::Duration::from_secs(
        config.retention.sweep_interval_secs,
    )));

    collector.set_service_state("running");
    info!(addr = %addr, "Engine is running");

    // Graceful shutdown on SIGINT/SIGTERM
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }

    collector.set_service_state("stopped");
    Ok(())
}

async fn run_sweep_once(config: EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let deps = build_deps(&config).await?;
    let sweeper = RetentionSweeper::new(
        deps.tasks,
        deps.objects,
        chrono::Duration::seconds(config.retention.abandoned_after_secs as i64),
        chrono::Duration::seconds(config.retention.purge_after_secs as i64),
    );
    let report = sweeper.sweep(chrono::Utc::now()).await;
    info!(
        expired = report.expired,
        purged = report.purged,
        "Sweep pass complete"
    );
    Ok(())
}

fn handle_config_command(
    config: EngineConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
