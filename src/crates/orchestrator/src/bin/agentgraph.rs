//! agentgraph CLI
//!
//! Inspect checkpoint trees and validate graph definitions.

use agentgraph_checkpoint::FileCheckpointStore;
use agentgraph_core::InMemoryGraphStore;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orchestrator::config::{load_graph_file, EngineConfig};
use orchestrator::logging::init_tracing;
use orchestrator::SqliteTaskRecords;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "agentgraph")]
#[command(about = "Inspect agent executions and validate graph definitions", long_about = None)]
#[command(version)]
struct Cli {
    /// Checkpoint root directory (overrides the config file)
    #[arg(long, global = true, env = "AGENTGRAPH_CHECKPOINT_ROOT")]
    root: Option<PathBuf>,

    /// Engine configuration file (YAML)
    #[arg(long, global = true, env = "AGENTGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Task-record database URL, e.g. sqlite:tasks.db
    #[arg(long, global = true, env = "AGENTGRAPH_DATABASE_URL")]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show workflow metadata and the step list of a task
    Inspect {
        task_id: String,
    },

    /// Print every step record of a task as JSON
    Steps {
        task_id: String,
    },

    /// Load the latest state of a task through the fallback tiers
    Load {
        task_id: String,

        /// Print the full state instead of a summary
        #[arg(long)]
        full: bool,
    },

    /// Validate a graph definition file
    ValidateGraph {
        /// Path to YAML or JSON file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info");
    let cli = Cli::parse();

    match &cli.command {
        Commands::ValidateGraph { file } => validate_graph(file),
        Commands::Inspect { task_id } => inspect(&open_store(&cli).await?, task_id).await,
        Commands::Steps { task_id } => steps(&open_store(&cli).await?, task_id).await,
        Commands::Load { task_id, full } => load(&open_store(&cli).await?, task_id, *full).await,
    }
}

async fn open_store(cli: &Cli) -> Result<FileCheckpointStore> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let root = cli.root.clone().unwrap_or(config.checkpoint_root);

    let mut store = FileCheckpointStore::new(root);
    if let Some(url) = &cli.database {
        let records = SqliteTaskRecords::connect(url)
            .await
            .with_context(|| format!("connecting to {}", url))?;
        store = store.with_task_records(Arc::new(records));
    }
    Ok(store)
}

async fn inspect(store: &FileCheckpointStore, task_id: &str) -> Result<()> {
    let metadata = store
        .load_metadata(task_id)
        .await
        .with_context(|| format!("reading metadata of {}", task_id))?;
    println!("{}", serde_json::to_string_pretty(&metadata)?);

    println!("\nSteps:");
    for (number, path) in store.list_step_files(task_id).await? {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!("  {:>4}  {}", number, name);
    }
    Ok(())
}

async fn steps(store: &FileCheckpointStore, task_id: &str) -> Result<()> {
    let records = store
        .load_steps(task_id)
        .await
        .with_context(|| format!("reading steps of {}", task_id))?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

async fn load(store: &FileCheckpointStore, task_id: &str, full: bool) -> Result<()> {
    let loaded = store
        .load_with_fallback(task_id)
        .await
        .with_context(|| format!("loading state of {}", task_id))?;

    println!("Source: {}", loaded.source);
    if full {
        println!("{}", serde_json::to_string_pretty(&loaded.state)?);
        return Ok(());
    }

    let state = &loaded.state;
    println!("Goal: {}", state.task_goal());
    println!("Actions: {}", state.action_history().len());
    for summary in state.action_summaries() {
        println!("  [{}] {} - {}", summary.status.as_str(), summary.tool, summary.description);
    }
    println!("Usage: {}", serde_json::to_string(&state.usage)?);
    Ok(())
}

fn validate_graph(file: &PathBuf) -> Result<()> {
    let definition =
        load_graph_file(file).with_context(|| format!("validating {}", file.display()))?;
    let name = definition.name.clone();
    let nodes = definition.nodes.len();
    let edges = definition.edges.len();
    InMemoryGraphStore::from_definition(definition)?;
    println!("✓ Graph '{}' is valid ({} nodes, {} edges)", name, nodes, edges);
    Ok(())
}
