//! TOML configuration for messenger-monitor.
//!
//! Every section falls back to sensible defaults, so an empty file (or no
//! file at all) yields a working setup backed by `data/messenger-monitor.db`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "MESSENGER_MONITOR_CONFIG";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub transports: Vec<TransportConfig>,
    /// Absent means no scheduler is configured; an empty list means a
    /// scheduler with nothing scheduled.
    #[serde(default)]
    pub schedules: Option<Vec<ScheduleConfig>>,
}

impl MonitorConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve configuration, in order:
    /// 1. An explicit path (from `--config`); failing to load it is an error.
    /// 2. The path in `MESSENGER_MONITOR_CONFIG`.
    /// 3. `./messenger-monitor.toml`.
    /// 4. Compiled-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "{} set but file could not be loaded, trying fallback",
                        CONFIG_ENV
                    );
                }
            }
        }

        let local = Path::new("messenger-monitor.toml");
        if local.exists() {
            return Self::load(local);
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite history database.
    pub path: PathBuf,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// Upper bound on a single history query (milliseconds). `0` disables it.
    pub query_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/messenger-monitor.db"),
            pool_size: 4,
            query_timeout_ms: 5_000,
        }
    }
}

impl StorageConfig {
    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_ms > 0).then(|| Duration::from_millis(self.query_timeout_ms))
    }
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Number of recent messages listed on the overview.
    pub recent_limit: u32,
    /// Render durations and times in human-friendly form.
    pub humanize: bool,
    /// Annotate cron triggers with their next fire time.
    pub cron_next_run: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            recent_limit: 15,
            humanize: true,
            cron_next_run: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Transports and schedules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub name: String,
}

/// A recurring task as declared to the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub name: String,
    /// Cron expression with a leading seconds field.
    pub cron: String,
    /// Message type the schedule dispatches.
    pub message_type: String,
    #[serde(default = "default_schedule_transport")]
    pub transport: String,
}

fn default_schedule_transport() -> String {
    "scheduler_default".to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
