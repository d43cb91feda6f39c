use std::net::SocketAddr;

use anyhow::{anyhow, Context};
use fieldsync_core::sync::SyncConfig;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8088";
const DEFAULT_DATA_DIR: &str = "./data";

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub data_dir: String,
    /// Base URL of the survey backend the queue drains into.
    pub api_url: String,
    pub api_token: Option<String>,
    /// When set, reachability is probed over HTTP instead of being pushed
    /// through `POST /api/v1/network`.
    pub probe_url: Option<String>,
    pub sync: SyncConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let listen_addr = read("FS_LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("FS_LISTEN_ADDR is not a socket address")?;
        let data_dir = read("FS_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        let api_url = read("FIELDSYNC_API_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .ok_or_else(|| anyhow!("FIELDSYNC_API_URL must be set"))?;
        let sync = SyncConfig::from_lookup(&lookup)?;

        Ok(Self {
            listen_addr,
            data_dir,
            api_url,
            api_token: read("FIELDSYNC_API_TOKEN"),
            probe_url: read("FIELDSYNC_PROBE_URL"),
            sync,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_api_url_is_set() {
        let config =
            Config::from_lookup(lookup(&[("FIELDSYNC_API_URL", "https://survey.test/")])).unwrap();
        assert_eq!(config.api_url, "https://survey.test");
        assert_eq!(config.listen_addr.to_string(), DEFAULT_LISTEN_ADDR);
        assert_eq!(config.data_dir, DEFAULT_DATA_DIR);
        assert!(config.api_token.is_none());
        assert_eq!(config.sync, SyncConfig::default());
    }

    #[test]
    fn missing_api_url_is_an_error() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn sync_settings_flow_through() {
        let config = Config::from_lookup(lookup(&[
            ("FIELDSYNC_API_URL", "https://survey.test"),
            ("FIELDSYNC_BATCH_SIZE", "10"),
            ("FIELDSYNC_AUTO_SYNC", "false"),
            ("FIELDSYNC_PROBE_URL", "https://survey.test/health"),
        ]))
        .unwrap();
        assert_eq!(config.sync.batch_size, 10);
        assert!(!config.sync.auto_sync);
        assert_eq!(config.probe_url.as_deref(), Some("https://survey.test/health"));
    }

    #[test]
    fn invalid_sync_settings_are_rejected() {
        let result = Config::from_lookup(lookup(&[
            ("FIELDSYNC_API_URL", "https://survey.test"),
            ("FIELDSYNC_SYNC_INTERVAL_MINUTES", "0"),
        ]));
        assert!(result.is_err());
    }
}
