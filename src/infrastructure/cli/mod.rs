//! Outlet CLI: `clap` derive subcommands dispatching into core methods,
//! `anyhow::Result` at the boundary, covering the batch-submit / resume /
//! run lifecycle.

use crate::backend::Backend;
use crate::config::OutletConfig;
use crate::op::UserOp;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "outlet", about = "Two-pane file reconciliation engine")]
pub struct Cli {
    /// Data directory holding config, the op ledger, node caches and
    /// staging files. Defaults to the platform data dir.
    #[arg(long, global = true, env = "OUTLET_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create (or confirm) the data directory and default config.
    Init,
    /// Resume pending ops from the ledger and drain the OpGraph until empty.
    Run {
        /// Stop once the graph is empty instead of waiting for more batches.
        #[arg(long)]
        once: bool,
    },
    /// Print pending/executing op counts from the ledger and graph.
    Status,
    /// Submit a batch of ops read from a JSON file (an array of `UserOp`).
    Submit {
        path: PathBuf,
    },
    /// Cancel every pending op still sitting in the ledger.
    CancelAll,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = cli
        .data_dir
        .unwrap_or_else(|| dirs_data_dir().join("outlet"));

    let config = OutletConfig::load_or_create(&data_dir).context("loading config")?;

    match cli.command {
        Command::Init => {
            config.ensure_directories().context("creating data directories")?;
            println!("{} {}", style("initialized").green(), data_dir.display());
            Ok(())
        }
        Command::Run { once } => run_executor(config, once).await,
        Command::Status => print_status(config).await,
        Command::Submit { path } => submit_batch(config, &path).await,
        Command::CancelAll => cancel_all(config).await,
    }
}

fn dirs_data_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(std::env::temp_dir)
}

async fn run_executor(config: OutletConfig, once: bool) -> Result<()> {
    let backend = std::sync::Arc::new(Backend::start(config).await.context("starting backend")?);
    info!(pending_ops = backend.op_manager.graph().len(), "backend started");

    let executor = backend.executor(None);

    if once {
        let (tx, rx) = tokio::sync::watch::channel(false);
        let graph = backend.op_manager.graph().clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                if graph.is_empty() {
                    let _ = tx.send(true);
                    break;
                }
            }
        });
        executor.run(rx).await;
    } else {
        let shutdown_backend = backend.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("ctrl-c received, shutting down");
            shutdown_backend.shutdown();
        });
        executor.run(backend.shutdown_receiver()).await;
    }

    backend.persist_watermark().await.context("persisting uid watermark")?;
    println!("{}", style("executor drained").green());
    Ok(())
}

async fn print_status(config: OutletConfig) -> Result<()> {
    let backend = Backend::start(config).await.context("starting backend")?;
    let pending = backend.ledger.load_all_pending_ops().await.context("loading pending ops")?;

    let mut table = Table::new();
    table.set_header(vec!["metric", "value"]);
    table.add_row(vec!["pending ops".to_string(), pending.len().to_string()]);
    table.add_row(vec!["graph size".to_string(), backend.op_manager.graph().len().to_string()]);
    println!("{table}");
    Ok(())
}

async fn submit_batch(config: OutletConfig, path: &PathBuf) -> Result<()> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let ops: Vec<UserOp> = serde_json::from_str(&raw).context("parsing batch file as JSON UserOp array")?;
    let count = ops.len();

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}").unwrap());
    spinner.set_message(format!("submitting {count} ops..."));
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));

    let backend = Backend::start(config).await.context("starting backend")?;
    let result = backend.op_manager.append_new_pending_op_batch(ops).await;

    spinner.finish_and_clear();
    result.context("submitting batch")?;

    println!("{} {} ops", style("submitted").green(), count);
    Ok(())
}

async fn cancel_all(config: OutletConfig) -> Result<()> {
    let backend = Backend::start(config).await.context("starting backend")?;
    let count = backend.op_manager.cancel_all_pending().await.context("cancelling pending ops")?;
    println!("{} {} ops", style("cancelled").yellow(), count);
    Ok(())
}
