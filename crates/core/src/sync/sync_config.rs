//! Sync engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Error, Result};

pub const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 15;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BATCH_SIZE: i64 = 50;
pub const DEFAULT_SYNC_COOLDOWN_SECS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Gates the periodic sync task entirely.
    pub auto_sync: bool,
    pub sync_interval_minutes: u64,
    /// Failed attempts tolerated before an entry is dropped.
    pub max_retries: u32,
    /// Upper bound on entries drained per cycle.
    pub batch_size: i64,
    /// Minimum delay between two drain starts.
    pub cooldown_secs: u64,
    /// Timeout applied to every remote call.
    pub request_timeout_secs: u64,
    /// Keep a copy of dropped entries in `sync_dead_letters`.
    pub keep_dead_letters: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: true,
            sync_interval_minutes: DEFAULT_SYNC_INTERVAL_MINUTES,
            max_retries: DEFAULT_MAX_RETRIES,
            batch_size: DEFAULT_BATCH_SIZE,
            cooldown_secs: DEFAULT_SYNC_COOLDOWN_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            keep_dead_letters: false,
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `FIELDSYNC_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(value) = read("FIELDSYNC_AUTO_SYNC") {
            config.auto_sync = parse_bool("FIELDSYNC_AUTO_SYNC", &value)?;
        }
        if let Some(value) = read("FIELDSYNC_SYNC_INTERVAL_MINUTES") {
            config.sync_interval_minutes = parse_number("FIELDSYNC_SYNC_INTERVAL_MINUTES", &value)?;
        }
        if let Some(value) = read("FIELDSYNC_MAX_RETRIES") {
            config.max_retries = parse_number("FIELDSYNC_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read("FIELDSYNC_BATCH_SIZE") {
            config.batch_size = parse_number("FIELDSYNC_BATCH_SIZE", &value)?;
        }
        if let Some(value) = read("FIELDSYNC_SYNC_COOLDOWN_SECS") {
            config.cooldown_secs = parse_number("FIELDSYNC_SYNC_COOLDOWN_SECS", &value)?;
        }
        if let Some(value) = read("FIELDSYNC_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_number("FIELDSYNC_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read("FIELDSYNC_KEEP_DEAD_LETTERS") {
            config.keep_dead_letters = parse_bool("FIELDSYNC_KEEP_DEAD_LETTERS", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync_interval_minutes == 0 {
            return Err(Error::Config(
                "syncIntervalMinutes must be at least 1".to_string(),
            ));
        }
        if self.batch_size < 1 {
            return Err(Error::Config("batchSize must be at least 1".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "requestTimeoutSecs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_minutes.saturating_mul(60))
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!(
            "{} must be a boolean, got '{}'",
            key, value
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| Error::Config(format!("{} must be a number, got '{}'", key, value)))
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
    fn defaults_apply_without_env() {
        let config = SyncConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.cooldown(), Duration::from_secs(10));
    }

    #[test]
    fn env_overrides_are_parsed() {
        let config = SyncConfig::from_lookup(lookup_from(&[
            ("FIELDSYNC_AUTO_SYNC", "false"),
            ("FIELDSYNC_SYNC_INTERVAL_MINUTES", "5"),
            ("FIELDSYNC_MAX_RETRIES", "2"),
            ("FIELDSYNC_BATCH_SIZE", "10"),
            ("FIELDSYNC_KEEP_DEAD_LETTERS", "yes"),
        ]))
        .unwrap();
        assert!(!config.auto_sync);
        assert_eq!(config.sync_interval(), Duration::from_secs(300));
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.batch_size, 10);
        assert!(config.keep_dead_letters);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let err = SyncConfig::from_lookup(lookup_from(&[("FIELDSYNC_BATCH_SIZE", "0")]));
        assert!(matches!(err, Err(Error::Config(_))));

        let err = SyncConfig::from_lookup(lookup_from(&[("FIELDSYNC_AUTO_SYNC", "maybe")]));
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn deserializes_partial_json_with_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"autoSync": false, "maxRetries": 1}"#).unwrap();
        assert!(!config.auto_sync);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    }
}
