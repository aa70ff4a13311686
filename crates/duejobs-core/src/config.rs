use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

pub const DEFAULT_TABLE: &str = "jobs";
pub const DEFAULT_INTERVAL_MS: i64 = 1_000;

/// Top-level config (duejobs.toml + DUEJOBS_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuejobsConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Polling scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Name of the jobs table inside the database.
    #[serde(default = "default_table")]
    pub table: String,
    /// Sweep cadence. Signed so a bad value reaches `Scheduler::start` as
    /// `InvalidInterval` instead of failing deserialization.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: i64,
    /// Verbose tracing of scheduling/execution events. Observability only.
    /// Override with env var: DUEJOBS_SCHEDULER__DEBUG=true
    #[serde(default)]
    pub debug: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            table: default_table(),
            interval_ms: default_interval_ms(),
            debug: false,
        }
    }
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}
fn default_interval_ms() -> i64 {
    DEFAULT_INTERVAL_MS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.duejobs/duejobs.db", home)
}

impl DuejobsConfig {
    /// Load config from a TOML file with DUEJOBS_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.duejobs/duejobs.toml
    ///
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        // `__` separates nesting so keys like `interval_ms` survive intact.
        let config: DuejobsConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("DUEJOBS_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduler.table.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "scheduler.table",
                reason: "must not be empty".to_string(),
            });
        }
        if self.scheduler.interval_ms < 0 {
            return Err(ConfigError::Invalid {
                key: "scheduler.interval_ms",
                reason: format!("must be non-negative, got {}", self.scheduler.interval_ms),
            });
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.duejobs/duejobs.toml", home)
}
