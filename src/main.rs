//! Main entry point for the Spades Room service
//!
//! Serves health, metrics and wait time estimate endpoints, or runs a
//! self-contained waiting-room walkthrough against an in-memory store.

use anyhow::Result;
use clap::{Parser, Subcommand};
use spades_room::config::AppConfig;
use spades_room::data::{InMemoryDataService, RoomStore};
use spades_room::metrics::{HealthServer, HealthServerConfig, MetricsCollector};
use spades_room::simulation;
use spades_room::types::GameType;
use spades_room::wait_time::{SystemClock, WaitTimeProvider};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Spades Room - matchmaking wait estimates and waiting-room presence
#[derive(Parser)]
#[command(
    name = "spades-room",
    version,
    about = "Matchmaking wait time estimates and waiting-room presence for Spades tables"
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// HTTP port override
    #[arg(long, value_name = "PORT", help = "Override HTTP server port")]
    http_port: Option<u16>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand)]
enum Mode {
    /// Serve health, metrics and estimate endpoints (default)
    Serve,
    /// Seed an in-memory store and walk four players through a room
    Simulate {
        #[arg(long, default_value = "partnered")]
        game_type: GameType,
        #[arg(long, default_value_t = 0.0)]
        wager: f64,
    },
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("♠ Spades Room Service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   HTTP port: {}", config.service.http_port);
    info!(
        "   Estimate bounds: {}s-{}s (refresh every {:?})",
        config.estimator.min_wait_seconds,
        config.estimator.max_wait_seconds,
        config.refresh_interval()
    );
    info!(
        "   Activity feed: seed {}, display {}",
        config.room.activity_seed_limit, config.room.activity_display_limit
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load and merge configuration from file or environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    // Apply CLI overrides
    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(http_port) = args.http_port {
        config.service.http_port = http_port;
    }

    spades_room::config::validate_config(&config)?;
    Ok(config)
}

async fn serve(config: AppConfig, metrics: Arc<MetricsCollector>) -> Result<()> {
    let store = RoomStore::new(Arc::new(InMemoryDataService::new()));
    let provider = WaitTimeProvider::new(store, Arc::new(SystemClock), config.estimator.clone())?
        .with_metrics(metrics.clone());

    let server = Arc::new(
        HealthServer::new(
            HealthServerConfig {
                port: config.service.http_port,
                ..HealthServerConfig::default()
            },
            metrics,
        )
        .with_estimator(Arc::new(provider)),
    );

    let server_task = {
        let server = server.clone();
        tokio::spawn(async move { server.start().await })
    };

    info!("✅ Spades Room Service is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    wait_for_shutdown_signal().await;

    info!("🛑 Shutdown signal received, beginning graceful shutdown...");
    server.stop();

    match tokio::time::timeout(config.shutdown_timeout(), server_task).await {
        Ok(Ok(Ok(()))) => info!("✅ Graceful shutdown completed successfully"),
        Ok(Ok(Err(e))) => error!("Health server failed: {}", e),
        Ok(Err(e)) => error!("Health server task panicked: {}", e),
        Err(_) => warn!("⚠️  Shutdown timeout exceeded, forcing exit"),
    }

    info!("🛑 Spades Room Service stopped");
    Ok(())
}

async fn simulate(
    config: AppConfig,
    metrics: Arc<MetricsCollector>,
    game_type: GameType,
    wager: f64,
) -> Result<()> {
    let report = simulation::run(&config, metrics, game_type, wager).await?;

    println!(
        "Estimated wait for {} at wager {}: {} ({}s)",
        game_type, wager, report.estimate.formatted, report.estimate.estimated_seconds
    );
    println!(
        "Room {} is {} (phase: {})",
        report.room.id,
        report.room.status,
        report.room.current_phase.as_deref().unwrap_or("-")
    );
    for player in &report.room.players {
        println!(
            "  {:<16} {:<6} ready={} host={}",
            player.name,
            player
                .position
                .map(|seat| format!("{:?}", seat).to_lowercase())
                .unwrap_or_else(|| "-".to_string()),
            player.is_ready,
            player.is_host
        );
    }
    println!("Activity:");
    for event in &report.activity {
        println!(
            "  {} {:<8} {}",
            event.timestamp.format("%H:%M:%S"),
            event.kind.as_str(),
            event.player_name
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config);
    let metrics = Arc::new(MetricsCollector::new()?);

    match args.mode.unwrap_or(Mode::Serve) {
        Mode::Serve => serve(config, metrics).await,
        Mode::Simulate { game_type, wager } => simulate(config, metrics, game_type, wager).await,
    }
}
