//! Triggerflow worker: runs one workspace until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use triggerflow_engine::{
    admin, unmarshal_trigger, EventSourceDescriptor, InMemoryEventHub, Registries, Storage,
    Workspace,
};

mod config;

use config::WorkerConfig;

#[derive(Parser)]
#[command(name = "triggerflow-worker")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the worker config file
    #[arg(short, long, default_value = "triggerflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured workspace until Ctrl-C
    Run,

    /// Register the configured workspace in storage
    Init,

    /// Store a trigger read from a JSON file
    AddTrigger {
        /// Path to the trigger record
        file: PathBuf,
    },

    /// Store an event source descriptor
    AddEventSource {
        /// Registered event source class (e.g. "file")
        #[arg(long)]
        class: String,

        /// Name the source is stored under
        #[arg(long)]
        name: String,

        /// Class-specific parameters as JSON
        #[arg(long, default_value = "{}")]
        parameters: String,
    },

    /// Set one global context entry
    SetGlobal {
        key: String,

        /// JSON value; anything that does not parse is stored as a string
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = WorkerConfig::load(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let registries = build_registries();

    match cli.command {
        Commands::Run => run(config, registries).await,
        Commands::Init => {
            let storage = open_storage(&config, &registries).await?;
            admin::register_workspace(storage.as_ref(), &config.workspace).await?;
            Ok(())
        }
        Commands::AddTrigger { file } => {
            let storage = open_storage(&config, &registries).await?;
            let raw = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let record = unmarshal_trigger(&raw)?;
            admin::put_trigger(storage.as_ref(), &config.workspace, &record).await?;
            tracing::info!(trigger_id = %record.id, "trigger stored");
            Ok(())
        }
        Commands::AddEventSource {
            class,
            name,
            parameters,
        } => {
            let storage = open_storage(&config, &registries).await?;
            let parameters: Value =
                serde_json::from_str(&parameters).context("parsing --parameters")?;
            let descriptor = EventSourceDescriptor::new(class, name, parameters);
            admin::put_event_source(storage.as_ref(), &config.workspace, &descriptor).await?;
            tracing::info!(source = %descriptor.name, "event source stored");
            Ok(())
        }
        Commands::SetGlobal { key, value } => {
            let storage = open_storage(&config, &registries).await?;
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            admin::put_global(storage.as_ref(), &config.workspace, &key, &value).await?;
            Ok(())
        }
    }
}

fn build_registries() -> Registries {
    let mut registries = Registries::with_defaults();
    InMemoryEventHub::new().register(&mut registries);
    triggerflow_storage_oss::register(&mut registries);
    registries
}

async fn open_storage(config: &WorkerConfig, registries: &Registries) -> Result<Arc<dyn Storage>> {
    let constructor = registries
        .storage_backend(&config.storage.backend)
        .with_context(|| format!("unknown storage backend '{}'", config.storage.backend))?;
    let storage = constructor(config.storage.parameters.clone()).await?;
    Ok(storage)
}

async fn run(config: WorkerConfig, registries: Registries) -> Result<()> {
    let workspace = Workspace::builder(&config.workspace)
        .registries(registries)
        .backend(config.storage.clone())
        .config(config.engine.clone())
        .build()
        .await
        .with_context(|| format!("bootstrapping workspace '{}'", config.workspace))?;

    let shutdown = workspace.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
        }
        shutdown.shutdown();
    });

    workspace.run().await?;
    tracing::info!(stats = ?workspace.stats(), "worker stopped");
    Ok(())
}
