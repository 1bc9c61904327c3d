//! hwmetrics — machine telemetry Q&A service.
//!
//! Usage:
//!   hwmetrics serve       Start the HTTP API server
//!   hwmetrics collect     Run the metrics collector only
//!   hwmetrics daemon      Run collector + API server together
//!   hwmetrics ask <text>  Ask a one-shot question from the CLI
//!   hwmetrics status      Show database summary

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use hwmetrics::collector::Collector;
use hwmetrics::config::{self, Config};
use hwmetrics::llm::{self, ChatClient};
use hwmetrics::server::{self, AppState};
use hwmetrics::state::Database;
use hwmetrics::tools::ToolCatalog;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "hwmetrics")]
#[command(version)]
#[command(about = "Machine telemetry Q&A service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to hwmetrics home directory.
    #[arg(long, default_value = "~/.hwmetrics")]
    home: String,

    /// Log level (debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP API server.
    Serve,

    /// Run the metrics collector only.
    Collect,

    /// Run collector and API server together.
    Daemon,

    /// Ask a one-shot question from the CLI.
    Ask {
        /// The question, in natural language.
        text: Vec<String>,
    },

    /// Show a summary of the metrics database.
    Status,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    // Resolve home directory
    let home_dir = PathBuf::from(shellexpand::tilde(&cli.home).into_owned());

    match cli.command {
        Commands::Serve => cmd_serve(&home_dir, false).await,
        Commands::Collect => cmd_collect(&home_dir).await,
        Commands::Daemon => cmd_serve(&home_dir, true).await,
        Commands::Ask { text } => cmd_ask(&home_dir, &text.join(" ")).await,
        Commands::Status => cmd_status(&home_dir).await,
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

async fn cmd_serve(home_dir: &Path, with_collector: bool) -> Result<()> {
    let (config, db) = bootstrap(home_dir)?;

    let catalog = load_catalog(&config)?;
    let client = ChatClient::new(&config).context("Failed to build chat client")?;

    println!(
        "{} Starting hwmetrics on {} (model: {})",
        ">>>".green().bold(),
        config.listen_addr,
        config.llm_model,
    );

    let cancel = CancellationToken::new();

    let collector_handle = if with_collector {
        let collector = Collector::new(config.clone(), db.clone());
        let collector_cancel = cancel.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = collector.run(collector_cancel).await {
                error!("collector error: {e:#}");
            }
        }))
    } else {
        None
    };

    let state = AppState {
        config,
        catalog,
        client,
        db,
    };
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::serve(state, server_cancel).await {
            error!("server error: {e:#}");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    println!("\n{} Shutting down gracefully...", "<<<".red().bold());
    cancel.cancel();

    let shutdown_timeout = tokio::time::Duration::from_secs(10);
    let _ = tokio::time::timeout(shutdown_timeout, async {
        if let Some(handle) = collector_handle {
            let _ = handle.await;
        }
        let _ = server_handle.await;
    })
    .await;

    info!("shutdown complete");
    Ok(())
}

async fn cmd_collect(home_dir: &Path) -> Result<()> {
    let (config, db) = bootstrap(home_dir)?;

    println!(
        "{} Starting collector (every {}s)",
        ">>>".green().bold(),
        config.metrics_interval_seconds,
    );

    let cancel = CancellationToken::new();
    let collector = Collector::new(config, db);

    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        if let Err(e) = collector.run(run_cancel).await {
            error!("collector error: {e:#}");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    cancel.cancel();
    let _ = handle.await;

    Ok(())
}

async fn cmd_ask(home_dir: &Path, text: &str) -> Result<()> {
    if text.trim().is_empty() {
        anyhow::bail!("Empty question. Usage: hwmetrics ask <text>");
    }

    let (config, db) = bootstrap(home_dir)?;
    let catalog = load_catalog(&config)?;
    let client = ChatClient::new(&config).context("Failed to build chat client")?;

    let answer = llm::ask_with_tools(&config, &catalog, &client, &db, text)
        .await
        .context("Ask request failed")?;

    println!("{answer}");
    Ok(())
}

async fn cmd_status(home_dir: &Path) -> Result<()> {
    let (config, db) = bootstrap(home_dir)?;

    let db_lock = db.lock().await;
    let hosts = db_lock.host_count()?;
    let (cpu, ram, gpu) = db_lock.sample_counts()?;
    let latest = db_lock
        .latest_sample_ts()?
        .unwrap_or_else(|| "never".into());
    drop(db_lock);

    println!();
    println!("{}", "=== hwmetrics Status ===".bold());
    println!();
    println!("  {}:  {}", "Database".bold(), config.resolved_db_path());
    println!("  {}:     {}", "Hosts".bold(), hosts);
    println!("  {}:", "Samples".bold());
    println!("    CPU:    {cpu}");
    println!("    RAM:    {ram}");
    println!("    GPU:    {gpu}");
    println!("  {}:    {}", "Latest".bold(), latest);
    println!("  {}:     {}", "Model".bold(), config.llm_model);
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Bootstrap the runtime: load config and open the database.
fn bootstrap(home_dir: &Path) -> Result<(Config, Arc<Mutex<Database>>)> {
    if !home_dir.exists() {
        std::fs::create_dir_all(home_dir)
            .with_context(|| format!("Failed to create home directory: {}", home_dir.display()))?;
    }

    let config_path = home_dir.join("hwmetrics.toml");
    let config = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = config.resolved_db_path();
    let db = Database::open(Path::new(&db_path))
        .with_context(|| format!("Failed to open database at {db_path}"))?;

    Ok((config, Arc::new(Mutex::new(db))))
}

/// Load the tool catalog; a malformed catalog is startup-fatal.
fn load_catalog(config: &Config) -> Result<ToolCatalog> {
    let dir = config.resolved_tools_dir();
    ToolCatalog::load(Path::new(&dir))
        .with_context(|| format!("Failed to load tool catalog from {dir}"))
}
