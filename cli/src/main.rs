//! chainscoped — the chainscope indexer daemon.
//!
//! Usage:
//! ```bash
//! chainscoped run config.toml
//! chainscoped version
//! ```
//!
//! Registers the configured contracts, starts the block monitor against the
//! configured node and runs until interrupted. The read API is a library
//! surface (`chainscope-rpc`); the wire server binding embeds it.

use std::env;
use std::path::Path;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chainscope_core::database::AddressStore;
use chainscope_monitor::{BlockMonitor, HttpNodeClient, MonitorConfig, RetryConfig};
use chainscope_storage::MemoryDatabase;

mod config;

use config::{Config, LogConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("run") => {
            let path = args.get(2).map(String::as_str).unwrap_or("chainscope.toml");
            run(Path::new(path)).await
        }
        Some("version") | Some("--version") | Some("-V") => {
            println!("chainscoped {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some("help") | Some("--help") | Some("-h") | None => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    }
}

fn print_usage() {
    println!("chainscoped {}", env!("CARGO_PKG_VERSION"));
    println!("Contract-scoped indexer for Ethereum-compatible ledgers\n");
    println!("USAGE:");
    println!("    chainscoped <COMMAND>\n");
    println!("COMMANDS:");
    println!("    run [CONFIG]  Start indexing (default config: chainscope.toml)");
    println!("    version       Print version");
    println!("    help          Print this help");
}

fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

async fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    init_tracing(&config.log);

    let db = Arc::new(MemoryDatabase::new());
    for watched in &config.addresses {
        let address: Address = watched
            .address
            .parse()
            .with_context(|| format!("invalid watch address {:?}", watched.address))?;
        match watched.from {
            Some(from) => db.add_address_from(address, from).await?,
            None => db.add_addresses(vec![address]).await?,
        }
        tracing::info!(address = %address, from = watched.from, "watching contract");
    }

    let client = Arc::new(HttpNodeClient::new(
        &config.node_url,
        Duration::from_secs(config.request_timeout_secs),
        Duration::from_millis(config.poll_interval_ms),
    )?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor_config = MonitorConfig {
        max_in_flight: config.max_in_flight,
        retry: RetryConfig::default(),
    };
    let mut monitor = BlockMonitor::new(Arc::clone(&db), client, monitor_config, shutdown_rx);
    let monitor_handle = tokio::spawn(async move { monitor.run().await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested, draining in-flight work");
    shutdown_tx.send(true)?;
    monitor_handle.await??;
    Ok(())
}
