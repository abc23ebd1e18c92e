//! # FleetFlow — Opportunity Monitor
//!
//! Polls an upstream procurement API, detects new opportunities and notifies
//! brokers, dispatchers and carriers on their preferred channels.
//!
//! Usage:
//!   fleetflow init                  # Write a starter config
//!   fleetflow run                   # Poll until Ctrl+C
//!   fleetflow check                 # Run one cycle and print the result
//!   fleetflow status                # Show stored state and recent notifications

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fleetflow_channels::channels_from_config;
use fleetflow_core::config::FleetFlowConfig;
use fleetflow_core::types::{Portal, Recipient};
use fleetflow_scheduler::{
    CycleOutcome, FleetFlowDb, HttpOpportunitySource, InAppChannel, NotificationDispatcher,
    NotificationStore, OpportunityMonitor, RetryingFetcher, spawn_monitor,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "fleetflow",
    version,
    about = "🚚 FleetFlow — opportunity monitor and notification fan-out"
)]
struct Cli {
    /// Config file (default: ~/.fleetflow/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a starter config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Poll on the configured interval until Ctrl+C
    Run,
    /// Run a single cycle and print the outcome as JSON
    Check,
    /// Show the stored cache and recent notifications
    Status {
        /// Notifications shown per recipient
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        "fleetflow=debug,fleetflow_scheduler=debug,fleetflow_channels=debug"
    } else {
        "fleetflow=info,fleetflow_scheduler=info,fleetflow_channels=info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }
}

fn config_path(cli: &Cli) -> PathBuf {
    match &cli.config {
        Some(p) => PathBuf::from(shellexpand::tilde(p).to_string()),
        None => FleetFlowConfig::default_path(),
    }
}

fn load_config(path: &std::path::Path) -> Result<FleetFlowConfig> {
    if path.exists() {
        FleetFlowConfig::load_from(path).with_context(|| format!("loading {}", path.display()))
    } else {
        tracing::warn!("⚠️ No config at {}, using defaults", path.display());
        Ok(FleetFlowConfig::default())
    }
}

/// Wire source, guards, channels and storage into a monitor.
fn build_monitor(config: &FleetFlowConfig, store: Arc<NotificationStore>) -> Result<OpportunityMonitor> {
    let source = Arc::new(HttpOpportunitySource::new(
        &config.monitor.name,
        config.monitor.source.clone(),
    ));
    let fetcher = RetryingFetcher::from_config(source, config);

    let mut dispatcher = NotificationDispatcher::from_config(&config.dispatch);
    dispatcher.register(Arc::new(InAppChannel::new(store)));
    for sender in channels_from_config(&config.channels) {
        dispatcher.register(sender);
    }
    let channels: Vec<String> = dispatcher
        .registered_channels()
        .iter()
        .map(ToString::to_string)
        .collect();
    tracing::info!("📡 Delivery channels: {}", channels.join(", "));

    let db = FleetFlowDb::open(&config.database.resolved_path()).context("opening database")?;
    let monitor = OpportunityMonitor::new(
        config.monitor.clone(),
        fetcher,
        Arc::new(dispatcher),
        config.recipients.clone(),
    )
    .with_db(db)?;
    Ok(monitor)
}

fn starter_config() -> FleetFlowConfig {
    let mut config = FleetFlowConfig::default();
    let mut admin = Recipient::new("admin", "FleetFlow Admin", Portal::Admin);
    admin.email = Some("admin@example.com".into());
    config.recipients.push(admin);
    config.monitor.target_portals = vec![Portal::Admin, Portal::Broker];
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);
    let path = config_path(&cli);

    match cli.command {
        Command::Init { force } => {
            if path.exists() && !force {
                println!("⚠️  Config already exists at {} (use --force)", path.display());
                return Ok(());
            }
            starter_config().save_to(&path)?;
            println!("✅ Config written to {}", path.display());
            println!("   Set monitor.source.api_key and edit recipients before `fleetflow run`.");
        }

        Command::Run => {
            let config = load_config(&path)?;
            let store = Arc::new(NotificationStore::new(config.dispatch.in_app_history));
            let monitor = build_monitor(&config, store)?;
            let interval = Duration::from_secs(config.monitor.interval_secs);

            let handle = spawn_monitor(monitor, interval);
            tokio::signal::ctrl_c().await.context("waiting for Ctrl+C")?;
            tracing::info!("🛑 Shutting down...");

            if let Some(monitor) = handle.stop().await {
                let stats = serde_json::to_string_pretty(monitor.stats())?;
                println!("{stats}");
            }
        }

        Command::Check => {
            let config = load_config(&path)?;
            let store = Arc::new(NotificationStore::new(config.dispatch.in_app_history));
            let mut monitor = build_monitor(&config, store)?;

            let outcome = match monitor.run_cycle().await {
                CycleOutcome::Completed { fetched, new, reports } => serde_json::json!({
                    "status": "completed",
                    "fetched": fetched,
                    "new": new,
                    "reports": reports,
                }),
                CycleOutcome::Skipped { reason } => serde_json::json!({
                    "status": "skipped",
                    "reason": reason,
                }),
            };
            let out = serde_json::json!({
                "monitor": monitor.name(),
                "outcome": outcome,
                "fetcher": monitor.fetcher_status(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }

        Command::Status { limit } => {
            let config = load_config(&path)?;
            let db = FleetFlowDb::open(&config.database.resolved_path()).context("opening database")?;
            let seen = db.load_seen_ids(&config.monitor.name)?;

            println!("🚚 FleetFlow status");
            println!("   Config:    {}", path.display());
            println!("   Database:  {}", config.database.resolved_path().display());
            println!(
                "   Monitor:   {} every {}s ({} known opportunities)",
                config.monitor.name,
                config.monitor.interval_secs,
                seen.len()
            );
            println!(
                "   Guards:    {} calls/hour, breaker {} failures / {}s",
                config.rate_limit.max_per_window(),
                config.circuit_breaker.max_failures,
                config.circuit_breaker.reset_timeout_secs
            );

            for recipient in &config.recipients {
                let recent = db.recent_notifications(&recipient.id, limit)?;
                let unread = recent.iter().filter(|n| !n.read).count();
                println!(
                    "\n👤 {} ({}, {}): {} recent, {} unread",
                    recipient.name,
                    recipient.id,
                    recipient.portal,
                    recent.len(),
                    unread
                );
                for n in recent {
                    let mark = if n.read { " " } else { "•" };
                    println!(
                        "   {mark} [{}] {} — {}",
                        n.priority,
                        n.timestamp.format("%Y-%m-%d %H:%M"),
                        n.title
                    );
                }
            }
        }
    }

    Ok(())
}
