use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::store::KeyPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file '{path}': {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("failed to parse config file '{path}': {source}")]
  Parse {
    path: String,
    #[source]
    source: toml::de::Error,
  },
  #[error("invalid config: {0}")]
  Invalid(String),
}

/// Log configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LogConfig {
  /// Log file path, if not set, logs will be printed to stdout
  pub file: Option<String>,
  /// Log level, default is "info"
  #[serde(default = "default_log_level")]
  pub level: String,
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      file: None,
      level: default_log_level(),
    }
  }
}

/// HTTP listener configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
  /// Listening address
  #[serde(default = "default_server_addr")]
  pub addr: String,
  /// Deadline for receiving a complete request head
  #[serde(default = "default_read_timeout_secs")]
  pub read_timeout_secs: u64,
  /// Deadline for producing one response
  #[serde(default = "default_write_timeout_secs")]
  pub write_timeout_secs: u64,
}

fn default_server_addr() -> String {
  "0.0.0.0:1321".to_string()
}

fn default_read_timeout_secs() -> u64 {
  5
}

fn default_write_timeout_secs() -> u64 {
  10
}

impl ServerConfig {
  pub fn read_timeout(&self) -> Duration {
    Duration::from_secs(self.read_timeout_secs)
  }

  pub fn write_timeout(&self) -> Duration {
    Duration::from_secs(self.write_timeout_secs)
  }
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      addr: default_server_addr(),
      read_timeout_secs: default_read_timeout_secs(),
      write_timeout_secs: default_write_timeout_secs(),
    }
  }
}

/// Promotion feed configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FeedConfig {
  /// Path of the comma-delimited feed file
  #[serde(default = "default_feed_path")]
  pub path: PathBuf,
  /// Seconds between background reloads
  #[serde(default = "default_reload_interval_secs")]
  pub reload_interval_secs: u64,
  #[serde(default)]
  pub key_policy: KeyPolicy,
}

fn default_feed_path() -> PathBuf {
  PathBuf::from("promotions.csv")
}

fn default_reload_interval_secs() -> u64 {
  1800
}

impl FeedConfig {
  pub fn reload_interval(&self) -> Duration {
    Duration::from_secs(self.reload_interval_secs)
  }
}

impl Default for FeedConfig {
  fn default() -> Self {
    Self {
      path: default_feed_path(),
      reload_interval_secs: default_reload_interval_secs(),
      key_policy: KeyPolicy::default(),
    }
  }
}

/// promodb configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Config {
  #[serde(default)]
  pub server: ServerConfig,

  #[serde(default)]
  pub feed: FeedConfig,

  /// Log configuration
  #[serde(default)]
  pub log: LogConfig,
}

impl Config {
  /// Load configuration from TOML file
  pub fn from_file(path: &str) -> Result<Self, ConfigError> {
    let config_str = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_string(),
      source,
    })?;

    let config: Config = toml::from_str(&config_str).map_err(|source| ConfigError::Parse {
      path: path.to_string(),
      source,
    })?;

    config.validate()?;

    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.feed.path.as_os_str().is_empty() {
      return Err(ConfigError::Invalid("feed.path must not be empty".to_string()));
    }
    if self.feed.reload_interval_secs == 0 {
      return Err(ConfigError::Invalid(
        "feed.reload_interval_secs must be greater than 0".to_string(),
      ));
    }
    if self.server.read_timeout_secs == 0 || self.server.write_timeout_secs == 0 {
      return Err(ConfigError::Invalid(
        "server timeouts must be greater than 0".to_string(),
      ));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_default_config() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.server.addr, "0.0.0.0:1321");
    assert_eq!(config.server.read_timeout(), Duration::from_secs(5));
    assert_eq!(config.server.write_timeout(), Duration::from_secs(10));
    assert_eq!(config.feed.path, PathBuf::from("promotions.csv"));
    assert_eq!(config.feed.reload_interval(), Duration::from_secs(1800));
    assert_eq!(config.feed.key_policy, KeyPolicy::Sequential);
    assert_eq!(config.log.level, "info");
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_full_config() {
    let config_str = r#"
[server]
addr = "127.0.0.1:8080"
read_timeout_secs = 2

[feed]
path = "/data/promotions.csv"
reload_interval_secs = 60
key_policy = "feed_identifier"

[log]
level = "debug"
file = "/tmp/promodb.log"
"#;

    let config: Config = toml::from_str(config_str).unwrap();
    assert_eq!(config.server.addr, "127.0.0.1:8080");
    assert_eq!(config.server.read_timeout_secs, 2);
    assert_eq!(config.server.write_timeout_secs, 10);
    assert_eq!(config.feed.path, PathBuf::from("/data/promotions.csv"));
    assert_eq!(config.feed.reload_interval_secs, 60);
    assert_eq!(config.feed.key_policy, KeyPolicy::FeedIdentifier);
    assert_eq!(config.log.level, "debug");
    assert_eq!(config.log.file.as_deref(), Some("/tmp/promodb.log"));
  }

  #[test]
  fn test_validate_rejects_zero_interval() {
    let mut config = Config::default();
    config.feed.reload_interval_secs = 0;
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
  }

  #[test]
  fn test_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[feed]\nreload_interval_secs = 5").unwrap();

    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.feed.reload_interval_secs, 5);
  }

  #[test]
  fn test_from_file_errors() {
    assert!(matches!(
      Config::from_file("/definitely/not/here.toml"),
      Err(ConfigError::Read { .. })
    ));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[feed\npath = ").unwrap();
    assert!(matches!(
      Config::from_file(file.path().to_str().unwrap()),
      Err(ConfigError::Parse { .. })
    ));
  }
}
