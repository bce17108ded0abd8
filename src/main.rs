use clap::{Parser, Subcommand};
use ordex::adapters::{ChannelBroker, PostgresStore};
use ordex::config::{AppConfig, LoggingConfig};
use ordex::error::{ExecutionError, Result};
use ordex::execution::{decider_from_config, ExecutionCoordinator, PlacementConsumer};
use ordex::persistence::OutboxRelay;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ordex", about = "Event-driven order execution service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the execution service
    Run {
        /// Configuration directory
        #[arg(long, default_value = "config", env = "ORDEX_CONFIG_DIR")]
        config_dir: String,
    },
    /// Apply database migrations and exit
    Migrate {
        /// Configuration directory
        #[arg(long, default_value = "config", env = "ORDEX_CONFIG_DIR")]
        config_dir: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config_dir } => {
            let config = load_config(&config_dir)?;
            init_logging(&config.logging);
            run_service(config).await
        }
        Commands::Migrate { config_dir } => {
            let config = load_config(&config_dir)?;
            init_logging(&config.logging);
            let store =
                PostgresStore::new(&config.database.url, config.database.max_connections).await?;
            store.migrate().await
        }
    }
}

fn load_config(config_dir: &str) -> Result<AppConfig> {
    let config = AppConfig::load_from(config_dir)?;
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config error: {e}");
        }
        return Err(ExecutionError::Internal(format!(
            "invalid configuration ({} errors)",
            errors.len()
        )));
    }
    Ok(config)
}

async fn run_service(config: AppConfig) -> Result<()> {
    info!("Starting order execution service");

    let store = Arc::new(
        PostgresStore::new(&config.database.url, config.database.max_connections).await?,
    );
    store.migrate().await?;

    let broker = Arc::new(ChannelBroker::new(config.channels.queue_capacity));
    let decider = decider_from_config(&config.decider);

    // Explicit wiring: the coordinator gets its collaborators by reference,
    // and the inbound topic is bound to it here rather than by any implicit
    // listener registration.
    let coordinator = Arc::new(ExecutionCoordinator::new(
        store.clone(),
        decider,
        &config.channels.order_executed_topic,
    ));

    let consumer = PlacementConsumer::new(
        config.consumer.clone(),
        &config.channels.order_placed_topic,
        broker.clone(),
        coordinator,
        store.clone(),
    );
    consumer.start();

    let relay = OutboxRelay::new(config.outbox.clone(), store.clone(), broker.clone());
    relay.start();

    info!(
        "Consuming {} and publishing {}",
        config.channels.order_placed_topic, config.channels.order_executed_topic
    );

    shutdown_signal().await;

    info!("Shutting down");
    consumer.stop();
    relay.stop();

    let stats = consumer.stats().await;
    info!(
        "Consumer stats: {} received, {} executed, {} rejected, {} replayed, {} malformed, {} failed",
        stats.events_received,
        stats.events_executed,
        stats.events_rejected,
        stats.events_replayed,
        stats.events_malformed,
        stats.events_failed
    );
    let relay_stats = relay.stats().await;
    info!(
        "Relay stats: {} published, {} failed",
        relay_stats.rows_published, relay_stats.rows_failed
    );

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},ordex=debug,sqlx=warn", config.level)));

    if config.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
