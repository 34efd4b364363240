//! Daemon configuration, loaded from a TOML file.

use std::fs;
use std::path::Path;

use serde::Deserialize;

/// One contract to watch, with an optional starting block.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchedContract {
    pub address: String,
    #[serde(default)]
    pub from: Option<u64>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// EnvFilter directive, e.g. `"info"` or `"info,chainscope_monitor=debug"`.
    pub level: String,
    /// Emit JSON structured logs instead of human-readable text.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// JSON-RPC endpoint of the node to index.
    pub node_url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Maximum concurrent block fetches.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Contracts registered at startup.
    #[serde(default)]
    pub addresses: Vec<WatchedContract>,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_in_flight() -> usize {
    8
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let config: Config = toml::from_str(r#"node_url = "http://localhost:8545""#).unwrap();
        assert_eq!(config.poll_interval_ms, 2_000);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.max_in_flight, 8);
        assert!(config.addresses.is_empty());
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn watch_entries_parse() {
        let config: Config = toml::from_str(
            r#"
            node_url = "http://localhost:8545"

            [[addresses]]
            address = "0x1932c48b2bf8102ba33b4a6b545c32236e342f34"
            from = 100

            [[addresses]]
            address = "0xed9d02e382b34818e88b88a309c7fe71e65f419d"
            "#,
        )
        .unwrap();
        assert_eq!(config.addresses.len(), 2);
        assert_eq!(config.addresses[0].from, Some(100));
        assert_eq!(config.addresses[1].from, None);
    }
}
