//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Runtime settings for the engine and its request loop.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// How long a unit of work waits for the writer lock before failing
    pub busy_timeout_ms: u64,
    /// Actor recorded on audit entries when a request names none
    pub default_actor: String,
    /// Default tracing filter (overridden by `RUST_LOG`)
    pub log_filter: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("clinic.db"),
            busy_timeout_ms: 5_000,
            default_actor: "system".into(),
            log_filter: "info".into(),
            json_logs: false,
        }
    }
}

impl EngineConfig {
    /// Read settings from `CLINIC_*` environment variables, falling back to
    /// defaults for any that are unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = lookup("CLINIC_DB_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(value) = lookup("CLINIC_BUSY_TIMEOUT_MS") {
            config.busy_timeout_ms = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "CLINIC_BUSY_TIMEOUT_MS",
                value: value.clone(),
            })?;
        }
        if let Some(actor) = lookup("CLINIC_ACTOR") {
            config.default_actor = actor;
        }
        if let Some(filter) = lookup("CLINIC_LOG") {
            config.log_filter = filter;
        }
        if let Some(value) = lookup("CLINIC_LOG_JSON") {
            config.json_logs = match value.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" | "" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "CLINIC_LOG_JSON",
                        value,
                    })
                }
            };
        }

        Ok(config)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("CLINIC_DB_PATH", "/var/lib/clinic/stock.db"),
            ("CLINIC_BUSY_TIMEOUT_MS", "250"),
            ("CLINIC_ACTOR", "front-desk"),
            ("CLINIC_LOG_JSON", "true"),
        ]))
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/var/lib/clinic/stock.db"));
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.default_actor, "front-desk");
        assert!(config.json_logs);
    }

    #[test]
    fn test_invalid_timeout() {
        let result = EngineConfig::from_lookup(lookup_from(&[("CLINIC_BUSY_TIMEOUT_MS", "soon")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                key: "CLINIC_BUSY_TIMEOUT_MS",
                ..
            })
        ));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"databasePath": "x.db", "defaultActor": "dr.lim", "busy_timeout_ms": 1}"#,
        )
        .unwrap();
        assert_eq!(config.database_path, PathBuf::from("x.db"));
        assert_eq!(config.default_actor, "dr.lim");
        // Keys use the camelCase names; anything else is ignored
        assert_eq!(config.busy_timeout_ms, 5_000);
        assert!(!config.json_logs);
    }
}
