use std::io::ErrorKind;
use std::path::Path;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_saphyr::from_str(&contents)?)
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

/// Admin HTTP surface.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

// ============================================================================
// RelayConfig
// ============================================================================

/// External rewriting service.
#[derive(Debug, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_relay_endpoint")]
    pub endpoint_url: String,
    #[serde(default = "default_relay_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_item_delay")]
    pub item_delay_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            endpoint_url: default_relay_endpoint(),
            timeout_seconds: default_relay_timeout(),
            batch_size: default_batch_size(),
            item_delay_ms: default_item_delay(),
        }
    }
}

fn default_relay_endpoint() -> String {
    "http://127.0.0.1:8000/process".to_string()
}

fn default_relay_timeout() -> u64 {
    30
}

fn default_batch_size() -> usize {
    2
}

fn default_item_delay() -> u64 {
    1000
}

// ============================================================================
// PublishConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_item_delay")]
    pub item_delay_ms: u64,
    #[serde(default = "default_item_delay")]
    pub destination_delay_ms: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            item_delay_ms: default_item_delay(),
            destination_delay_ms: default_item_delay(),
        }
    }
}

// ============================================================================
// RetryConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RetryConfig {
    /// Recoverable-error requeue attempts before an item is failed
    /// permanently.
    #[serde(default = "default_ceiling")]
    pub ceiling: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            ceiling: default_ceiling(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_ceiling() -> u32 {
    3
}

// ============================================================================
// DedupConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DedupConfig {
    /// Hours between wholesale clears of the fingerprint cache.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: i64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
        }
    }
}

fn default_ttl_hours() -> i64 {
    24
}

// ============================================================================
// SchedulerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SchedulerConfig {
    /// Idle wait between cycles, cut short by the settings-changed
    /// signal.
    #[serde(default = "default_idle_interval")]
    pub idle_interval_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_interval_seconds: default_idle_interval(),
        }
    }
}

fn default_idle_interval() -> u64 {
    10
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.relay.timeout_seconds, 30);
        assert_eq!(config.relay.batch_size, 2);
        assert_eq!(config.publish.batch_size, 2);
        assert_eq!(config.retry.ceiling, 3);
        assert_eq!(config.dedup.ttl_hours, 24);
        assert_eq!(config.scheduler.idle_interval_seconds, 10);
    }

    #[tokio::test]
    async fn test_load_missing_file_returns_defaults() {
        let tmp_dir = TempDir::new().unwrap();
        let missing_path = tmp_dir.path().join("missing-config.yaml");
        let config = Config::load(&missing_path).await.unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.retry.ceiling, 3);
    }

    #[tokio::test]
    async fn test_load_valid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
server:
  host: "127.0.0.1"
  port: 3000
relay:
  endpoint_url: "http://ai.internal:9000/process"
  timeout_seconds: 60
  batch_size: 5
retry:
  ceiling: 5
dedup:
  ttl_hours: 48
scheduler:
  idle_interval_seconds: 30
"#
        )
        .unwrap();

        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.relay.endpoint_url, "http://ai.internal:9000/process");
        assert_eq!(config.relay.timeout_seconds, 60);
        assert_eq!(config.relay.batch_size, 5);
        assert_eq!(config.retry.ceiling, 5);
        assert_eq!(config.dedup.ttl_hours, 48);
        assert_eq!(config.scheduler.idle_interval_seconds, 30);
    }

    #[tokio::test]
    async fn test_load_partial_yaml_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
relay:
  endpoint_url: "http://ai.internal:9000/process"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(config.relay.endpoint_url, "http://ai.internal:9000/process");
        assert_eq!(config.relay.timeout_seconds, 30); // default
        assert_eq!(config.server.port, 8080); // default
        assert_eq!(config.retry.ceiling, 3); // default
    }

    #[tokio::test]
    async fn test_load_invalid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load(file.path()).await;
        assert!(result.is_err());
    }
}
