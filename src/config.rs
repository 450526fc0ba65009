//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (RULE_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [driver]
//! kind = "etcd"
//! endpoints = ["http://127.0.0.1:2379"]
//! prefix = "/rule/"
//!
//! [repository]
//! key_filter = "^/rule/"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! RULE_DRIVER__PREFIX=/custom/
//! RULE_LOGGING__LEVEL=debug
//! ```

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Top-level configuration for a running rule engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which coordination store backs the repository, and how to reach it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DriverConfig {
    /// No external store; useful for tests and single-process demos.
    Memory,
    /// An etcd cluster, addressed the way the source's etcd driver is.
    Etcd(EtcdConfig),
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig::Memory
    }
}

/// Connection settings for an etcd-backed driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtcdConfig {
    pub endpoints: Vec<String>,
    /// Key prefix all rule documents live under.
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,
}

fn default_dial_timeout_secs() -> u64 {
    5
}

/// Repository-level tuning: which keys to track.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Regex pattern; only keys it matches are loaded and watched. Empty
    /// tracks every key the driver reports.
    #[serde(default)]
    pub key_filter: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Merges in order:
    /// 1. config.toml (base configuration)
    /// 2. config.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (RULE_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("RULE_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path.
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("RULE_").split("__"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            driver: DriverConfig::default(),
            repository: RepositoryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_the_memory_driver() {
        let config = Config::default();
        assert!(matches!(config.driver, DriverConfig::Memory));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn etcd_driver_config_round_trips_through_toml() {
        let toml_str = r#"
[driver]
kind = "etcd"
endpoints = ["http://127.0.0.1:2379"]
prefix = "/rule/"

[repository]
key_filter = "^/rule/"
"#;
        let config: Config = Figment::new().merge(Toml::string(toml_str)).extract().unwrap();
        match config.driver {
            DriverConfig::Etcd(etcd) => {
                assert_eq!(etcd.endpoints, vec!["http://127.0.0.1:2379".to_string()]);
                assert_eq!(etcd.prefix, "/rule/");
            }
            DriverConfig::Memory => panic!("expected an etcd driver config"),
        }
        assert_eq!(config.repository.key_filter, "^/rule/");
    }
}
