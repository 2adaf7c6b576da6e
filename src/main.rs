use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use update_sweeper::config::DEFAULT_CONFIG_PATH;
use update_sweeper::{
    HttpDeliveryClient, SqliteQueueConnector, StaticRing, SweeperConfig, UpdateSweeper,
};

#[derive(Parser)]
#[command(name = "update-sweeper")]
#[command(about = "Deliver queued container updates to replica nodes")]
struct Cli {
    /// Path to configuration file
    config: Option<String>,

    /// Sweep only these locations (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    devices: Vec<String>,

    /// Sweep once, then exit
    #[arg(long)]
    once: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

/// The config path to load: the argument if it names an existing file, the default otherwise.
fn resolve_config_path(arg: Option<&str>) -> &str {
    match arg {
        Some(path) if Path::new(path).is_file() => path,
        _ => DEFAULT_CONFIG_PATH,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "update_sweeper=debug"
    } else {
        "update_sweeper=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = resolve_config_path(cli.config.as_deref());
    if let Some(arg) = cli.config.as_deref() {
        if arg != config_path {
            tracing::warn!(arg = %arg, "Not an existing file, using {}", config_path);
        }
    }
    tracing::info!("Starting update sweeper with config: {}", config_path);

    let mut config = match SweeperConfig::from_file(config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };
    if !cli.devices.is_empty() {
        config.devices = cli.devices;
    }

    let ring = match StaticRing::new(&config.container_ring) {
        Ok(ring) => ring,
        Err(e) => {
            tracing::error!("Failed to build container ring: {}", e);
            std::process::exit(1);
        }
    };
    if ring.nodes().is_empty() {
        tracing::warn!("Container ring has no nodes; every pending update will fail to resolve");
    }

    let delivery = match HttpDeliveryClient::new(
        config.conn_timeout_duration(),
        config.node_timeout_duration(),
    ) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to build delivery client: {}", e);
            std::process::exit(1);
        }
    };

    let connector = SqliteQueueConnector::new(&config.queue.root_dir, config.queue.wal_mode);
    let mut sweeper = UpdateSweeper::new(
        config,
        Arc::new(connector),
        Arc::new(ring),
        Arc::new(delivery),
    );

    if cli.once {
        let result = sweeper.run_once().await;
        sweeper.shutdown().await;
        if let Err(e) = result {
            tracing::error!("Sweep failed: {}", e);
            std::process::exit(1);
        }
        return;
    }

    if let Err(e) = sweeper.start().await {
        tracing::error!("Failed to start sweeper: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    sweeper.shutdown().await;
}
