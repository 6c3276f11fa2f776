//! Configuration for the session placement optimizer.
//!
//! Configuration is a flat TOML document plus a `[log]` table:
//!
//! ```toml
//! solver = "chp"
//! transforms = ["random-value-change"]
//! initial_session_value = 1.0
//! local_mttf = 3600.0
//! remote_mttf = 86400.0
//! read_cost = 0.01
//! write_cost = 0.02
//! storage_cost = 0.0001
//! persist_period_secs = 20
//! scavenge_period_secs = 30
//!
//! [log]
//! level = "debug"
//! format = "json"
//! ```
//!
//! Every key is optional. A value that cannot be interpreted for its key falls
//! back to the documented default and logs a warning; only unreadable files and
//! TOML syntax errors are reported as [`ConfigError`].

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::logging::LogConfig;

pub const DEFAULT_SOLVER: &str = "lp";
pub const DEFAULT_TRANSFORM: &str = "random-value-change";
pub const DEFAULT_INITIAL_SESSION_VALUE: f64 = 1.0;
pub const DEFAULT_PERSIST_PERIOD_SECS: u64 = 20;
pub const DEFAULT_SCAVENGE_PERIOD_SECS: u64 = 30;
pub const DEFAULT_MAX_INACTIVE_SECS: i64 = 1800;
pub const DEFAULT_LOCAL_CAPACITY_BYTES: u64 = 256 * 1024 * 1024;
pub const DEFAULT_CHP_SET_CUTOFF: usize = 32;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-friendly output
    #[default]
    Pretty,
    /// JSON lines
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}. Expected one of: pretty, json")),
        }
    }
}

/// Resolved optimizer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Solver registry name (see [`crate::optimizer::SolverKind`])
    pub solver: String,
    /// Transform chain applied to session values before each solve
    pub transforms: Vec<String>,
    /// Value assigned to a session when it is first seen
    pub initial_session_value: f64,
    /// Mean time to failure of local memory in seconds (0 = never fails)
    pub local_mttf: f64,
    /// Mean time to failure of the remote storage in seconds
    pub remote_mttf: f64,
    /// Cost of reading one session from remote storage
    pub read_cost: f64,
    /// Cost of writing one session to remote storage
    pub write_cost: f64,
    /// Cost of storing one MiB remotely for one second
    pub storage_cost: f64,
    /// Period of the persist/optimize cycle (0 disables the cycle)
    pub persist_period_secs: u64,
    /// Period of the idle-session scavenger (0 disables scavenging)
    pub scavenge_period_secs: u64,
    /// Idle timeout applied to new sessions (<= 0 never expires)
    pub max_inactive_secs: i64,
    /// Byte budget for sessions held in local memory
    pub local_capacity_bytes: u64,
    /// Partial-solution cutoff for the CHP heuristic
    pub chp_set_cutoff: usize,
    /// Simulate local memory loss when `local_mttf > 0`
    pub crash_simulation: bool,
    /// Logging configuration
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            solver: DEFAULT_SOLVER.to_string(),
            transforms: vec![DEFAULT_TRANSFORM.to_string()],
            initial_session_value: DEFAULT_INITIAL_SESSION_VALUE,
            local_mttf: 0.0,
            remote_mttf: 0.0,
            read_cost: 0.0,
            write_cost: 0.0,
            storage_cost: 0.0,
            persist_period_secs: DEFAULT_PERSIST_PERIOD_SECS,
            scavenge_period_secs: DEFAULT_SCAVENGE_PERIOD_SECS,
            max_inactive_secs: DEFAULT_MAX_INACTIVE_SECS,
            local_capacity_bytes: DEFAULT_LOCAL_CAPACITY_BYTES,
            chp_set_cutoff: DEFAULT_CHP_SET_CUTOFF,
            crash_simulation: true,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(display.clone())
            } else {
                ConfigError::ReadFailed(display.clone(), e.to_string())
            }
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML text, falling back per key.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = input
            .parse()
            .map_err(|e: toml::de::Error| ConfigError::ParseError(e.to_string()))?;

        let mut config = Self::default();
        for (key, value) in &table {
            match key.as_str() {
                "solver" => config.solver = string_value(key, value, config.solver),
                "transforms" | "transform" => {
                    config.transforms = string_list_value(key, value, config.transforms);
                }
                "initial_session_value" => {
                    config.initial_session_value =
                        f64_value(key, value, config.initial_session_value);
                }
                "local_mttf" => config.local_mttf = f64_value(key, value, config.local_mttf),
                "remote_mttf" => config.remote_mttf = f64_value(key, value, config.remote_mttf),
                "read_cost" => config.read_cost = f64_value(key, value, config.read_cost),
                "write_cost" => config.write_cost = f64_value(key, value, config.write_cost),
                "storage_cost" => config.storage_cost = f64_value(key, value, config.storage_cost),
                "persist_period_secs" => {
                    config.persist_period_secs =
                        u64_value(key, value, config.persist_period_secs);
                }
                "scavenge_period_secs" => {
                    config.scavenge_period_secs =
                        u64_value(key, value, config.scavenge_period_secs);
                }
                "max_inactive_secs" => {
                    config.max_inactive_secs = i64_value(key, value, config.max_inactive_secs);
                }
                "local_capacity_bytes" => {
                    config.local_capacity_bytes =
                        u64_value(key, value, config.local_capacity_bytes);
                }
                "chp_set_cutoff" => {
                    config.chp_set_cutoff =
                        u64_value(key, value, config.chp_set_cutoff as u64) as usize;
                }
                "crash_simulation" => {
                    config.crash_simulation = bool_value(key, value, config.crash_simulation);
                }
                "log" => match value.clone().try_into::<LogConfig>() {
                    Ok(log) => config.log = log,
                    Err(e) => warn!(key, error = %e, "invalid [log] table; using defaults"),
                },
                other => debug!(key = other, "ignoring unknown configuration key"),
            }
        }
        Ok(config)
    }

    /// Serialize the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeFailed(e.to_string()))
    }

    /// Fixed period between persist/optimize cycles.
    #[must_use]
    pub fn persist_period(&self) -> Duration {
        Duration::from_secs(self.persist_period_secs)
    }

    #[must_use]
    pub fn scavenge_period(&self) -> Duration {
        Duration::from_secs(self.scavenge_period_secs)
    }
}

fn fallback<T: fmt::Display>(key: &str, value: &toml::Value, default: T) -> T {
    warn!(key, value = %value, default = %default, "unparsable configuration value; using default");
    default
}

fn f64_value(key: &str, value: &toml::Value, default: f64) -> f64 {
    let parsed = match value {
        toml::Value::Float(f) => Some(*f),
        toml::Value::Integer(i) => Some(*i as f64),
        toml::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed.filter(|v| v.is_finite()) {
        Some(v) => v,
        None => fallback(key, value, default),
    }
}

fn i64_value(key: &str, value: &toml::Value, default: i64) -> i64 {
    let parsed = match value {
        toml::Value::Integer(i) => Some(*i),
        toml::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.unwrap_or_else(|| fallback(key, value, default))
}

fn u64_value(key: &str, value: &toml::Value, default: u64) -> u64 {
    let parsed = match value {
        toml::Value::Integer(i) => u64::try_from(*i).ok(),
        toml::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed.unwrap_or_else(|| fallback(key, value, default))
}

fn bool_value(key: &str, value: &toml::Value, default: bool) -> bool {
    let parsed = match value {
        toml::Value::Boolean(b) => Some(*b),
        toml::Value::String(s) => s.trim().parse::<bool>().ok(),
        _ => None,
    };
    parsed.unwrap_or_else(|| fallback(key, value, default))
}

fn string_value(key: &str, value: &toml::Value, default: String) -> String {
    match value {
        toml::Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => fallback(key, value, default),
    }
}

fn string_list_value(key: &str, value: &toml::Value, default: Vec<String>) -> Vec<String> {
    match value {
        toml::Value::String(s) => vec![s.trim().to_string()],
        toml::Value::Array(items) => {
            let names: Option<Vec<String>> = items
                .iter()
                .map(|item| item.as_str().map(|s| s.trim().to_string()))
                .collect();
            match names {
                Some(names) => names,
                None => {
                    warn!(key, value = %value, "transform list must contain only strings; using default");
                    default
                }
            }
        }
        _ => {
            warn!(key, value = %value, "unparsable configuration value; using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.solver, "lp");
        assert_eq!(config.transforms, vec!["random-value-change".to_string()]);
        assert_eq!(config.persist_period(), Duration::from_secs(20));
        assert_eq!(config.scavenge_period(), Duration::from_secs(30));
        assert_eq!(config.chp_set_cutoff, 32);
    }

    #[test]
    fn values_are_read_per_key() {
        let config = Config::from_toml_str(
            r#"
            solver = "chp"
            transforms = ["greater-random-value-change", "none"]
            local_mttf = 3600
            read_cost = 0.25
            persist_period_secs = 5
            crash_simulation = false

            [log]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.solver, "chp");
        assert_eq!(config.transforms.len(), 2);
        assert_eq!(config.local_mttf, 3600.0);
        assert_eq!(config.read_cost, 0.25);
        assert_eq!(config.persist_period_secs, 5);
        assert!(!config.crash_simulation);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn unparsable_values_fall_back_individually() {
        let config = Config::from_toml_str(
            r#"
            local_mttf = "soon"
            write_cost = "0.5"
            persist_period_secs = -4
            storage_cost = true
            "#,
        )
        .unwrap();

        assert_eq!(config.local_mttf, 0.0);
        assert_eq!(config.write_cost, 0.5);
        assert_eq!(config.persist_period_secs, DEFAULT_PERSIST_PERIOD_SECS);
        assert_eq!(config.storage_cost, 0.0);
    }

    #[test]
    fn single_transform_string_is_accepted() {
        let config = Config::from_toml_str(r#"transform = "none""#).unwrap();
        assert_eq!(config.transforms, vec!["none".to_string()]);
    }

    #[test]
    fn syntax_errors_are_reported() {
        let err = Config::from_toml_str("solver = ").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn serialized_config_reloads() {
        let mut config = Config::default();
        config.solver = "greedy-toyoda".to_string();
        config.storage_cost = 0.125;
        let text = config.to_toml_string().unwrap();
        assert_eq!(Config::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::Json.to_string(), "json");
    }
}
