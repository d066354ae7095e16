//! RelayKV Server Binary
//!
//! Starts a node: the client TCP server plus, optionally, the replication
//! primary or replica service.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use relaykv::config::{parse_size, RecoveryMode, WalSyncStrategy};
use relaykv::logging::init_logging;
use relaykv::{Config, Node};

/// RelayKV Server
#[derive(Parser, Debug)]
#[command(name = "relaykv-server")]
#[command(about = "In-memory key-value store with a write-ahead log and replication")]
#[command(version)]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Client listen address (host:port)
    #[arg(short, long)]
    listen: Option<String>,

    /// Maximum concurrent client connections
    #[arg(short, long)]
    max_connections: Option<usize>,

    /// Run without a write-ahead log
    #[arg(long)]
    in_memory: bool,

    /// Commands per WAL segment
    #[arg(long)]
    batch_size: Option<usize>,

    /// Milliseconds an open batch waits before flushing
    #[arg(long)]
    batch_timeout_ms: Option<u64>,

    /// WAL file rotation size, e.g. "10MB"
    #[arg(long)]
    max_segment_size: Option<String>,

    /// Rely on the OS page cache instead of syncing every segment
    #[arg(long)]
    no_fsync: bool,

    /// Cut a torn final segment on startup instead of refusing to start
    #[arg(long)]
    truncate_torn_tail: bool,

    /// Serve replicas on this address
    #[arg(long, conflicts_with = "replica_of")]
    primary_listen: Option<String>,

    /// Follow the primary at this replication address (read-only)
    #[arg(long)]
    replica_of: Option<String>,

    /// Milliseconds between replica sync rounds
    #[arg(long, default_value = "1000")]
    sync_interval_ms: u64,

    /// Log filter, e.g. "info" or "relaykv=debug"
    #[arg(long)]
    log_level: Option<String>,
}

fn main() {
    let args = Args::parse();

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Failed to initialise logging: {}", e);
        std::process::exit(2);
    }

    tracing::info!("RelayKV Server v{}", relaykv::VERSION);
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("Listen address: {}", config.network.listen_addr);

    let node = match Node::start(config) {
        Ok(node) => node,
        Err(e) => {
            tracing::error!("Failed to start node: {}", e);
            std::process::exit(1);
        }
    };

    let shutdown = node.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Received shutdown signal, stopping...");
        shutdown.trigger();
    }) {
        tracing::error!("Failed to install signal handler: {}", e);
        if let Err(e) = node.stop() {
            tracing::error!("Node error: {}", e);
        }
        std::process::exit(1);
    }

    if let Err(e) = node.run() {
        tracing::error!("Node error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}

fn build_config(args: &Args) -> relaykv::Result<Config> {
    let base = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let mut builder = base.into_builder();
    if let Some(dir) = &args.data_dir {
        builder = builder.data_dir(dir.clone());
    }
    if let Some(addr) = &args.listen {
        builder = builder.listen_addr(addr.as_str());
    }
    if let Some(max) = args.max_connections {
        builder = builder.max_connections(max);
    }
    if args.in_memory {
        builder = builder.in_memory();
    } else {
        if let Some(size) = args.batch_size {
            builder = builder.batch_size(size);
        }
        if let Some(ms) = args.batch_timeout_ms {
            builder = builder.batch_timeout(Duration::from_millis(ms));
        }
        if let Some(size) = &args.max_segment_size {
            builder = builder.max_segment_size(parse_size(size)?);
        }
        if args.no_fsync {
            builder = builder.wal_sync_strategy(WalSyncStrategy::OsBuffered);
        }
        if args.truncate_torn_tail {
            builder = builder.recovery_mode(RecoveryMode::TruncateTornTail);
        }
    }
    if let Some(addr) = &args.primary_listen {
        builder = builder.primary(addr.as_str());
    }
    if let Some(addr) = &args.replica_of {
        builder = builder.replica_of(addr.as_str(), Duration::from_millis(args.sync_interval_ms));
    }
    if let Some(level) = &args.log_level {
        builder = builder.log_level(level.as_str());
    }

    let config = builder.build();
    config.validate()?;
    Ok(config)
}
