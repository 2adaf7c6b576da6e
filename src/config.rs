//! Configuration for the update sweeper.
//!
//! Configuration is loaded once at startup with [`SweeperConfig::from_file()`]
//! and can also be constructed programmatically. Every field has a default, so
//! a minimal file only needs the ring and the policies.
//!
//! # Quick Start
//!
//! ```rust
//! use update_sweeper::config::SweeperConfig;
//!
//! let config = SweeperConfig {
//!     interval_sec: 60,
//!     devices: vec!["10.0.0.1:8123".into()],
//!     ..Default::default()
//! };
//! assert_eq!(config.interval().as_secs(), 60);
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! SweeperConfig
//! ├── interval_sec: u64            # Sweep interval (and jitter bound)
//! ├── concurrency: usize           # Locations swept in parallel
//! ├── objects_per_second: u32      # Entry rate limit (0 = unlimited)
//! ├── node_timeout / conn_timeout  # Delivery timeouts ("10s", "500ms")
//! ├── scan_page_size: usize        # Keys per range-scan page
//! ├── devices: Vec<String>         # Location override list
//! ├── recon_cache_path: String     # Directory of object.recon
//! ├── queue: QueueConfig           # SQLite queue layout
//! ├── container_ring: RingConfig   # Replica placement
//! └── policies: Vec<PolicyConfig>  # Locations owned per policy
//! ```
//!
//! # TOML Example
//!
//! ```toml
//! interval_sec = 300
//! concurrency = 2
//! node_timeout = "10s"
//!
//! [queue]
//! root_dir = "/srv/node/async"
//!
//! [container_ring]
//! part_power = 10
//! replicas = 3
//! hash_path_suffix = "changeme"
//! nodes = [
//!   { id = 1, ip = "10.0.0.1", port = 6201, device = "sdb" },
//!   { id = 2, ip = "10.0.0.2", port = 6201, device = "sdb" },
//!   { id = 3, ip = "10.0.0.3", port = 6201, device = "sdb" },
//! ]
//!
//! [[policies]]
//! index = 0
//! name = "gold"
//! devices = ["10.0.0.1:8123", "10.0.0.2:8123"]
//! ```
//!
//! Every key can be overridden from the environment with the
//! `UPDATE_SWEEPER` prefix, e.g. `UPDATE_SWEEPER__INTERVAL_SEC=60`.

use crate::error::{Result, SweepError};
use crate::resilience::RateLimitConfig;
use crate::ring::ReplicaNode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Config file used when none is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/update-sweeper/config.toml";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "UPDATE_SWEEPER";

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to `UpdateSweeper::new()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Target seconds between sweep starts. Also bounds the startup jitter.
    #[serde(default = "default_interval_sec")]
    pub interval_sec: u64,

    /// Maximum locations swept at the same time.
    /// A location is always owned by a single worker.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Entries processed per second across the process. 0 disables the limit.
    #[serde(default = "default_objects_per_second")]
    pub objects_per_second: u32,

    /// Timeout for a replica to answer one delivery (e.g., "10s").
    #[serde(default = "default_node_timeout")]
    pub node_timeout: String,

    /// Timeout for connecting to a replica (e.g., "500ms").
    #[serde(default = "default_conn_timeout")]
    pub conn_timeout: String,

    /// Keys fetched per range-scan page.
    #[serde(default = "default_scan_page_size")]
    pub scan_page_size: usize,

    /// Sweep only these locations instead of every policy location.
    #[serde(default)]
    pub devices: Vec<String>,

    /// Directory holding `object.recon`.
    #[serde(default = "default_recon_cache_path")]
    pub recon_cache_path: String,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub container_ring: RingConfig,

    #[serde(default)]
    pub policies: Vec<PolicyConfig>,
}

fn default_interval_sec() -> u64 {
    300
}

fn default_concurrency() -> usize {
    1
}

fn default_objects_per_second() -> u32 {
    50
}

fn default_node_timeout() -> String {
    "10s".to_string()
}

fn default_conn_timeout() -> String {
    "500ms".to_string()
}

fn default_scan_page_size() -> usize {
    1000
}

fn default_recon_cache_path() -> String {
    "/var/cache/update-sweeper".to_string()
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_sec: 300,
            concurrency: 1,
            objects_per_second: 50,
            node_timeout: "10s".to_string(),
            conn_timeout: "500ms".to_string(),
            scan_page_size: 1000,
            devices: Vec::new(),
            recon_cache_path: "/var/cache/update-sweeper".to_string(),
            queue: QueueConfig::default(),
            container_ring: RingConfig::default(),
            policies: Vec::new(),
        }
    }
}

impl SweeperConfig {
    /// Create a fast, unthrottled config for testing.
    pub fn for_testing(queue_root: &str) -> Self {
        Self {
            interval_sec: 1,
            objects_per_second: 0,
            node_timeout: "1s".to_string(),
            conn_timeout: "200ms".to_string(),
            scan_page_size: 2,
            recon_cache_path: queue_root.to_string(),
            queue: QueueConfig {
                root_dir: queue_root.to_string(),
                wal_mode: false,
            },
            ..Default::default()
        }
    }

    /// Load from a file, overlaid with `UPDATE_SWEEPER__*` environment variables.
    ///
    /// The format follows the file extension; unknown extensions are read as TOML.
    pub fn from_file(path: &str) -> Result<Self> {
        use ::config::{Config, Environment, File, FileFormat};

        let format = match Path::new(path).extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            Some("ini") => FileFormat::Ini,
            _ => FileFormat::Toml,
        };

        let settings = Config::builder()
            .add_source(File::new(path, format))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("devices")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| SweepError::Config(e.to_string()))?;

        let config: SweeperConfig = settings
            .try_deserialize()
            .map_err(|e| SweepError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the sweeper cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.interval_sec == 0 {
            return Err(SweepError::Config("interval_sec must be positive".to_string()));
        }
        if self.concurrency == 0 {
            return Err(SweepError::Config("concurrency must be positive".to_string()));
        }
        if self.scan_page_size == 0 {
            return Err(SweepError::Config("scan_page_size must be positive".to_string()));
        }
        parse_duration("node_timeout", &self.node_timeout)?;
        parse_duration("conn_timeout", &self.conn_timeout)?;
        self.container_ring.validate()
    }

    /// Sweep interval.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_sec)
    }

    /// Parse `node_timeout`, falling back to 10 seconds.
    pub fn node_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.node_timeout).unwrap_or(Duration::from_secs(10))
    }

    /// Parse `conn_timeout`, falling back to 500 milliseconds.
    pub fn conn_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.conn_timeout).unwrap_or(Duration::from_millis(500))
    }

    /// Rate limit for entry processing.
    ///
    /// Returns `None` if `objects_per_second` is 0.
    pub fn rate_limit_config(&self) -> Option<RateLimitConfig> {
        if self.objects_per_second == 0 {
            return None;
        }
        Some(RateLimitConfig::per_second(self.objects_per_second))
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| SweepError::Config(format!("{} {:?}: {}", field, value, e)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// QueueConfig: SQLite queue layout
// ═══════════════════════════════════════════════════════════════════════════════

/// Where the per-location queue databases live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Directory holding one `<location>.db` per location.
    #[serde(default = "default_queue_root")]
    pub root_dir: String,

    /// Open databases in WAL mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

fn default_queue_root() -> String {
    "/srv/node/async".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            root_dir: "/srv/node/async".to_string(),
            wal_mode: true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RingConfig: container ring
// ═══════════════════════════════════════════════════════════════════════════════

/// Static container ring description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingConfig {
    /// Partitions = 2^part_power.
    #[serde(default = "default_part_power")]
    pub part_power: u8,

    /// Replicas per partition.
    #[serde(default = "default_replicas")]
    pub replicas: usize,

    #[serde(default)]
    pub hash_path_prefix: String,

    #[serde(default)]
    pub hash_path_suffix: String,

    #[serde(default)]
    pub nodes: Vec<ReplicaNode>,
}

fn default_part_power() -> u8 {
    10
}

fn default_replicas() -> usize {
    3
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            part_power: 10,
            replicas: 3,
            hash_path_prefix: String::new(),
            hash_path_suffix: String::new(),
            nodes: Vec::new(),
        }
    }
}

impl RingConfig {
    /// Structural checks, by building the ring once.
    pub fn validate(&self) -> Result<()> {
        crate::ring::StaticRing::new(self).map(|_| ())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PolicyConfig: locations owned per storage policy
// ═══════════════════════════════════════════════════════════════════════════════

/// One storage policy and the locations it places objects on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub index: u32,

    #[serde(default)]
    pub name: String,

    /// Location identifiers (e.g., `host:port` of a drive).
    #[serde(default)]
    pub devices: Vec<String>,
}
