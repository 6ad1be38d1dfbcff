use std::collections::{BTreeMap, HashMap};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, Result};

pub const DEFAULT_ENABLED: bool = true;
pub const DEFAULT_DEBUG: bool = false;
pub const DEFAULT_WEEK_DAYS: &str = "monday, tuesday, wednesday, thursday, friday, saturday, sunday";
pub const DEFAULT_TIME: &str = "03:00";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_MAX_EXECUTION_SECS: u64 = 600;

/// Top-level config (cmdb.toml + CMDB_* env overrides).
///
/// Nested keys in env vars are separated by a double underscore, e.g.
/// `CMDB_CRON__POLL_INTERVAL_SECS=30`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CmdbConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cron: CronConfig,
    /// Per-process settings keyed by module code.
    #[serde(default)]
    pub modules: HashMap<String, ModuleSettings>,
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

/// Host poller settings. The poller owns the cadence; the recurrence
/// calculator never sleeps or retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Time budget handed to each scheduled process run.
    #[serde(default = "default_max_execution_secs")]
    pub max_execution_secs: u64,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_execution_secs: DEFAULT_MAX_EXECUTION_SECS,
        }
    }
}

/// Settings of one scheduled process (`[modules.<code>]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSettings {
    /// Module code these settings were looked up under. Filled in by
    /// [`CmdbConfig::module`].
    #[serde(skip)]
    pub code: String,
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default)]
    pub debug: bool,
    /// Explicit trace threshold (`none`, `info`, `error`). Overrides `debug`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_level: Option<String>,
    #[serde(default = "default_week_days")]
    pub week_days: String,
    #[serde(default = "default_time")]
    pub time: String,
    /// Process-specific keys, e.g. `retention_days`.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            code: String::new(),
            enabled: DEFAULT_ENABLED,
            debug: DEFAULT_DEBUG,
            debug_level: None,
            week_days: default_week_days(),
            time: default_time(),
            extra: BTreeMap::new(),
        }
    }
}

impl ModuleSettings {
    /// Look up a process-specific key, falling back to `default` when absent.
    ///
    /// A key that is present but cannot be read as `T` is an error rather
    /// than silently defaulted.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        match self.extra.get(key) {
            None => Ok(default),
            Some(value) => {
                serde_json::from_value(value.clone()).map_err(|e| CoreError::InvalidSetting {
                    module: self.code.clone(),
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_week_days() -> String {
    DEFAULT_WEEK_DAYS.to_string()
}
fn default_time() -> String {
    DEFAULT_TIME.to_string()
}
fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_max_execution_secs() -> u64 {
    DEFAULT_MAX_EXECUTION_SECS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cmdb/cmdb.db", home)
}

impl CmdbConfig {
    /// Load config from a TOML file with CMDB_* env var overrides.
    ///
    /// Falls back to `~/.cmdb/cmdb.toml` when no path is given. A missing
    /// file is not an error; every key has a default.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        debug!(%path, "loading configuration");

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("CMDB_").split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        figment
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Settings for `code`, or the documented defaults when the module has
    /// no section of its own.
    pub fn module(&self, code: &str) -> ModuleSettings {
        let mut settings = self.modules.get(code).cloned().unwrap_or_default();
        settings.code = code.to_string();
        settings
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cmdb/cmdb.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> CmdbConfig {
        CmdbConfig::from_figment(Figment::from(Toml::string(toml))).unwrap()
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse("");
        assert_eq!(config.cron.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
        assert_eq!(config.cron.max_execution_secs, DEFAULT_MAX_EXECUTION_SECS);
        assert!(config.database.path.ends_with("/.cmdb/cmdb.db"));
        assert!(config.modules.is_empty());
    }

    #[test]
    fn unknown_module_gets_documented_defaults() {
        let settings = parse("").module("backup");
        assert_eq!(settings.code, "backup");
        assert!(settings.enabled);
        assert!(!settings.debug);
        assert_eq!(settings.debug_level, None);
        assert_eq!(settings.week_days, DEFAULT_WEEK_DAYS);
        assert_eq!(settings.time, DEFAULT_TIME);
    }

    #[test]
    fn module_section_overrides_and_keeps_extra_keys() {
        let config = parse(
            r#"
            [modules.purge]
            enabled = false
            week_days = "saturday"
            time = "22:15"
            retention_days = 30
            "#,
        );
        let settings = config.module("purge");
        assert!(!settings.enabled);
        assert_eq!(settings.week_days, "saturday");
        assert_eq!(settings.time, "22:15");
        // Untouched keys still default.
        assert!(!settings.debug);
        assert_eq!(settings.get::<u32>("retention_days", 180).unwrap(), 30);
        assert_eq!(settings.get::<u32>("batch_size", 50).unwrap(), 50);
    }

    #[test]
    fn mistyped_extra_key_is_an_error() {
        let config = parse(
            r#"
            [modules.purge]
            retention_days = "forever"
            "#,
        );
        let err = config
            .module("purge")
            .get::<u32>("retention_days", 180)
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_SETTING");
        assert!(err.to_string().contains("retention_days"));
        assert!(err.to_string().contains("purge"));
    }

    #[test]
    fn wrongly_typed_known_key_fails_extraction() {
        let result = CmdbConfig::from_figment(Figment::from(Toml::string(
            "[cron]\npoll_interval_secs = \"often\"",
        )));
        assert!(matches!(result, Err(CoreError::Config(_))));
    }
}
