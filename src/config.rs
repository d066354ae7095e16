//! Configuration for RelayKV
//!
//! Centralized configuration with sensible defaults. A `Config` is built
//! once (from the builder or a JSON file) and handed down to every component;
//! nothing reads process-wide settings.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{RelayError, Result};

/// Main configuration for a RelayKV node
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     └── wal/
    ///           ├── wal_0000000001.bin
    ///           └── wal_0000000002.bin
    pub data_dir: PathBuf,

    /// Write-ahead log settings; `None` keeps the node purely in memory
    pub wal: Option<WalConfig>,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    pub network: NetworkConfig,

    // -------------------------------------------------------------------------
    // Replication Configuration
    // -------------------------------------------------------------------------
    pub replication: Option<ReplicationConfig>,

    // -------------------------------------------------------------------------
    // Logging Configuration
    // -------------------------------------------------------------------------
    pub logging: LoggingConfig,
}

/// Write-ahead log settings
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Maximum number of commands in one segment
    pub batch_size: usize,

    /// How long an open batch may wait for more commands
    pub batch_timeout: Duration,

    /// Rotate to a new file once the current one would exceed this many bytes
    pub max_segment_size: u64,

    /// Sync strategy: whether each segment write is fsynced
    pub sync_strategy: WalSyncStrategy,

    /// Upper bound on commands in flight into the batcher (None = unbounded)
    pub max_in_flight: Option<usize>,

    /// What to do with a truncated final segment on startup
    pub recovery_mode: RecoveryMode,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every segment write (safest)
    EveryWrite,

    /// Leave flushing to the OS page cache (fast, survives process crashes only)
    OsBuffered,
}

/// Startup behaviour when the log ends inside a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryMode {
    /// Any decode failure aborts startup
    Strict,

    /// A truncated last segment is cut from the last file; other corruption aborts
    TruncateTornTail,
}

/// Client-facing TCP settings
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// TCP listen address for the line protocol
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// A connection with no traffic for this long is closed
    pub idle_timeout: Duration,

    /// Longest accepted request line, in bytes
    pub max_line_length: usize,
}

/// Which side of log shipping this node plays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationRole {
    /// Serves "segments after ID" requests on `listen_addr`
    Primary { listen_addr: String },

    /// Polls `primary_addr` every `sync_interval`
    Replica {
        primary_addr: String,
        sync_interval: Duration,
    },
}

/// Replication settings
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    pub role: ReplicationRole,

    /// Connect/read/write timeout for replication sockets
    pub io_timeout: Duration,
}

/// Logging settings consumed by the server binary
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter directive (overridden by RUST_LOG)
    pub level: String,

    /// Log file; stderr when unset
    pub output: Option<PathBuf>,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            batch_timeout: Duration::from_millis(10),
            max_segment_size: 10 * 1024 * 1024, // 10 MB
            sync_strategy: WalSyncStrategy::EveryWrite,
            max_in_flight: None,
            recovery_mode: RecoveryMode::Strict,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3223".to_string(),
            max_connections: 100,
            idle_timeout: Duration::from_secs(300),
            max_line_length: 4 * 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./relaykv_data"),
            wal: Some(WalConfig::default()),
            network: NetworkConfig::default(),
            replication: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    const WAL_DIR: &'static str = "wal";

    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Builder seeded with this config, for layering overrides
    pub fn into_builder(self) -> ConfigBuilder {
        ConfigBuilder { config: self }
    }

    /// Directory holding the WAL files
    pub fn wal_dir(&self) -> PathBuf {
        self.data_dir.join(Self::WAL_DIR)
    }

    /// Load a config from a JSON file; absent keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Parse a config from JSON text
    pub fn from_json(content: &str) -> Result<Self> {
        let file: FileConfig = serde_json::from_str(content)
            .map_err(|e| RelayError::Config(format!("parse config: {}", e)))?;
        let config = file.into_config()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the node cannot run with
    pub fn validate(&self) -> Result<()> {
        if let Some(wal) = &self.wal {
            if wal.batch_size == 0 {
                return Err(RelayError::Config("wal batch_size must be > 0".into()));
            }
            if wal.max_segment_size == 0 {
                return Err(RelayError::Config("wal max_segment_size must be > 0".into()));
            }
            if wal.max_in_flight == Some(0) {
                return Err(RelayError::Config("wal max_in_flight must be > 0".into()));
            }
        }
        if self.network.max_connections == 0 {
            return Err(RelayError::Config("max_connections must be > 0".into()));
        }
        if self.replication.is_some() && self.wal.is_none() {
            return Err(RelayError::Config(
                "replication requires the write-ahead log".into(),
            ));
        }
        if let Some(ReplicationConfig {
            role: ReplicationRole::Replica { sync_interval, .. },
            ..
        }) = &self.replication
        {
            if sync_interval.is_zero() {
                return Err(RelayError::Config("sync_interval must be > 0".into()));
            }
        }
        Ok(())
    }

    /// True when this node only accepts writes from its primary
    pub fn is_replica(&self) -> bool {
        matches!(
            self.replication,
            Some(ReplicationConfig {
                role: ReplicationRole::Replica { .. },
                ..
            })
        )
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Replace the whole WAL section
    pub fn wal(mut self, wal: WalConfig) -> Self {
        self.config.wal = Some(wal);
        self
    }

    /// Run without a write-ahead log
    pub fn in_memory(mut self) -> Self {
        self.config.wal = None;
        self
    }

    /// Set the maximum number of commands per segment
    pub fn batch_size(mut self, size: usize) -> Self {
        self.wal_mut().batch_size = size;
        self
    }

    /// Set how long an open batch waits before flushing
    pub fn batch_timeout(mut self, timeout: Duration) -> Self {
        self.wal_mut().batch_timeout = timeout;
        self
    }

    /// Set the WAL file rotation size (in bytes)
    pub fn max_segment_size(mut self, bytes: u64) -> Self {
        self.wal_mut().max_segment_size = bytes;
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.wal_mut().sync_strategy = strategy;
        self
    }

    /// Bound the number of commands in flight into the batcher
    pub fn max_in_flight(mut self, limit: usize) -> Self {
        self.wal_mut().max_in_flight = Some(limit);
        self
    }

    /// Set the startup recovery mode
    pub fn recovery_mode(mut self, mode: RecoveryMode) -> Self {
        self.wal_mut().recovery_mode = mode;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.network.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.network.max_connections = count;
        self
    }

    /// Set the idle timeout for client connections
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.network.idle_timeout = timeout;
        self
    }

    /// Make this node a primary serving replicas on `addr`
    pub fn primary(mut self, addr: impl Into<String>) -> Self {
        self.config.replication = Some(ReplicationConfig {
            role: ReplicationRole::Primary {
                listen_addr: addr.into(),
            },
            io_timeout: DEFAULT_REPLICATION_IO_TIMEOUT,
        });
        self
    }

    /// Make this node a read-only replica of `primary_addr`
    pub fn replica_of(mut self, primary_addr: impl Into<String>, sync_interval: Duration) -> Self {
        self.config.replication = Some(ReplicationConfig {
            role: ReplicationRole::Replica {
                primary_addr: primary_addr.into(),
                sync_interval,
            },
            io_timeout: DEFAULT_REPLICATION_IO_TIMEOUT,
        });
        self
    }

    /// Set the log filter directive
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Write logs to a file instead of stderr
    pub fn log_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.logging.output = Some(path.into());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }

    fn wal_mut(&mut self) -> &mut WalConfig {
        self.config.wal.get_or_insert_with(WalConfig::default)
    }
}

const DEFAULT_REPLICATION_IO_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// File Format
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    wal: Option<FileWal>,
    network: Option<FileNetwork>,
    replication: Option<FileReplication>,
    logging: Option<FileLogging>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileWal {
    batch_size: Option<usize>,
    batch_timeout_ms: Option<u64>,
    max_segment_size: Option<String>,
    fsync: Option<bool>,
    max_in_flight: Option<usize>,
    truncate_torn_tail: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileNetwork {
    listen_addr: Option<String>,
    max_connections: Option<usize>,
    idle_timeout_ms: Option<u64>,
    max_line_length: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum FileReplication {
    Primary {
        listen_addr: String,
        io_timeout_ms: Option<u64>,
    },
    Replica {
        primary_addr: String,
        sync_interval_ms: u64,
        io_timeout_ms: Option<u64>,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileLogging {
    level: Option<String>,
    output: Option<PathBuf>,
}

impl FileConfig {
    fn into_config(self) -> Result<Config> {
        let mut config = Config::default();

        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }

        config.wal = match self.wal {
            None => None,
            Some(file) => {
                let mut wal = WalConfig::default();
                if let Some(size) = file.batch_size {
                    wal.batch_size = size;
                }
                if let Some(ms) = file.batch_timeout_ms {
                    wal.batch_timeout = Duration::from_millis(ms);
                }
                if let Some(size) = file.max_segment_size {
                    wal.max_segment_size = parse_size(&size)?;
                }
                if file.fsync == Some(false) {
                    wal.sync_strategy = WalSyncStrategy::OsBuffered;
                }
                wal.max_in_flight = file.max_in_flight;
                if file.truncate_torn_tail == Some(true) {
                    wal.recovery_mode = RecoveryMode::TruncateTornTail;
                }
                Some(wal)
            }
        };

        if let Some(net) = self.network {
            if let Some(addr) = net.listen_addr {
                config.network.listen_addr = addr;
            }
            if let Some(max) = net.max_connections {
                config.network.max_connections = max;
            }
            if let Some(ms) = net.idle_timeout_ms {
                config.network.idle_timeout = Duration::from_millis(ms);
            }
            if let Some(len) = net.max_line_length {
                config.network.max_line_length = parse_size(&len)? as usize;
            }
        }

        config.replication = self.replication.map(|file| match file {
            FileReplication::Primary {
                listen_addr,
                io_timeout_ms,
            } => ReplicationConfig {
                role: ReplicationRole::Primary { listen_addr },
                io_timeout: io_timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_REPLICATION_IO_TIMEOUT),
            },
            FileReplication::Replica {
                primary_addr,
                sync_interval_ms,
                io_timeout_ms,
            } => ReplicationConfig {
                role: ReplicationRole::Replica {
                    primary_addr,
                    sync_interval: Duration::from_millis(sync_interval_ms),
                },
                io_timeout: io_timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_REPLICATION_IO_TIMEOUT),
            },
        });

        if let Some(logging) = self.logging {
            if let Some(level) = logging.level {
                config.logging.level = level;
            }
            config.logging.output = logging.output;
        }

        Ok(config)
    }
}

/// Parse a human-readable size such as `"10MB"` or `"500b"` into bytes
///
/// Units: B, KB, MB, GB, TB (case-insensitive, binary multiples).
pub fn parse_size(size: &str) -> Result<u64> {
    let size = size.trim();
    let split = size
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(size.len());
    let (digits, unit) = size.split_at(split);

    let scale: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "B" => 1,
        "KB" => 1 << 10,
        "MB" => 1 << 20,
        "GB" => 1 << 30,
        "TB" => 1 << 40,
        _ => return Err(RelayError::Config(format!("invalid size: {:?}", size))),
    };

    let count: u64 = digits
        .parse()
        .map_err(|_| RelayError::Config(format!("not a numeric size: {:?}", size)))?;

    count
        .checked_mul(scale)
        .ok_or_else(|| RelayError::Config(format!("size overflows: {:?}", size)))
}
