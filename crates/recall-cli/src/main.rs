//! Recall CLI - inspect and manage cross-instance coordination from a shell.
//!
//! Every command opens the instance rooted at `--project` (default: the
//! current directory), runs once and prints its result as JSON on stdout.
//! Logs go to stderr.

mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use commands::Command;
use recall_core::Coordinator;
use std::path::PathBuf;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "recall")]
#[command(about = "Cross-instance coordination for Recall memory stores")]
struct Args {
    /// Project directory of the local instance (defaults to the current directory)
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    /// Path of the local store (defaults to <project>/.recall/memory.db)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Path of the shared registry file
    #[arg(long, global = true, env = "RECALL_REGISTRY")]
    registry: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let project = match args.project {
        Some(path) => path,
        None => std::env::current_dir().context("Failed to resolve current directory")?,
    };
    debug!("Project root: {}", project.display());

    let mut builder = Coordinator::builder(&project);
    if let Some(store) = args.store {
        builder = builder.store_path(store);
    }
    if let Some(registry) = args.registry {
        builder = builder.registry_path(registry);
    }
    let coordinator = builder
        .build()
        .with_context(|| format!("Failed to open instance at {}", project.display()))?;

    if let Command::Run = args.command {
        return run_until_interrupted(&coordinator).await;
    }

    let output = commands::execute(&coordinator, args.command)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Publish this instance and keep its heartbeat alive until Ctrl-C.
async fn run_until_interrupted(coordinator: &Coordinator) -> Result<()> {
    let entry = coordinator.start()?;
    info!(
        "Instance {} ({}) running, press Ctrl-C to stop",
        entry.instance_id, entry.label
    );
    println!("{}", serde_json::to_string_pretty(&entry)?);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");
    coordinator.shutdown()?;
    Ok(())
}
