//! Runtime configuration.
//!
//! The configuration is a single JSON document split into component-qualified
//! sections. Every section is `#[serde(default)]`, so a partial document
//! merges over the defaults field by field. A missing file is written with
//! the defaults on first run.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use crate::services::triggers::TriggerSpec;

/// How log lines are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestMode {
    /// Poll a growing log file.
    File,
    /// Connect to a line-forwarding endpoint, falling back to the file.
    Stream,
}

/// Identity of the controlled player.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub user_id: String,
    pub game_title: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            user_id: "Steve".to_string(),
            game_title: "Minecraft* 1.21.8".to_string(),
        }
    }
}

/// Ingestion settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Ingestion strategy.
    pub mode: IngestMode,
    /// WHATWG encoding label used to decode raw bytes.
    pub encoding: String,
    /// Forwarding endpoint host.
    pub host: String,
    /// Forwarding endpoint port.
    pub port: u16,
    /// Log file polled in file mode and after degradation.
    pub log_path: PathBuf,
    /// Interval between file polls.
    pub poll_interval_ms: u64,
    /// Connection attempts before degrading to the file.
    pub retry_limit: u32,
    /// Pause between connection attempts.
    pub retry_backoff_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            mode: IngestMode::Stream,
            encoding: "gbk".to_string(),
            host: "127.0.0.1".to_string(),
            port: 25334,
            log_path: PathBuf::from("latest.log"),
            poll_interval_ms: 200,
            retry_limit: 10,
            retry_backoff_ms: 2000,
        }
    }
}

impl IngestConfig {
    /// Poll interval as a duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Retry backoff as a duration.
    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Resolves the configured encoding label.
    pub fn text_encoding(&self) -> Result<&'static Encoding, ConfigError> {
        Encoding::for_label(self.encoding.trim().as_bytes()).ok_or_else(|| ConfigError::UnknownEncoding {
            label: self.encoding.clone(),
        })
    }

    /// `host:port` of the forwarding endpoint.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Server-specific tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Channel tag seen in chat lines, or a user-facing alias, to command prefix.
    pub chat_channels: BTreeMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let chat_channels = [
            ("交易", "tc"),
            ("G", "global"),
            ("L", "local"),
            ("国家", "nations chat"),
            ("RP", "rp"),
            ("全局", "global"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self { chat_channels }
    }
}

/// Dispatch scheduler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Capacity of the hand-off between ingestion pumps and the dispatcher.
    pub event_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { event_buffer: 1024 }
    }
}

/// Action execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    /// Default wait for a single step.
    pub step_timeout_ms: u64,
    /// Wait for a probe echo before falling back to the cached value.
    pub probe_timeout_ms: u64,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: 10_000,
            probe_timeout_ms: 5_000,
        }
    }
}

impl ActionConfig {
    /// Step timeout as a duration.
    #[must_use]
    pub const fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    /// Probe timeout as a duration.
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// The whole runtime configuration.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub player: PlayerConfig,
    pub ingest: IngestConfig,
    pub server: ServerConfig,
    pub scheduler: SchedulerConfig,
    pub actions: ActionConfig,
    pub triggers: Vec<TriggerSpec>,
}

impl AppConfig {
    /// Parses a configuration document, filling absent fields with defaults.
    pub fn from_json(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads the configuration, writing the defaults first if `path` is missing.
    pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let defaults = Self::default();
            let json = serde_json::to_string_pretty(&defaults).map_err(|source| ConfigError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
            fs::write(path, json).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            info!(path = %path.display(), "wrote default configuration");
            return Ok(defaults);
        }

        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(path, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_merges_over_defaults() {
        let raw = r#"{ "ingest": { "mode": "file", "port": 4000 }, "player": { "user_id": "Alex" } }"#;
        let cfg = AppConfig::from_json(Path::new("config.json"), raw).unwrap();

        assert_eq!(cfg.ingest.mode, IngestMode::File);
        assert_eq!(cfg.ingest.port, 4000);
        assert_eq!(cfg.ingest.encoding, "gbk");
        assert_eq!(cfg.ingest.retry_limit, 10);
        assert_eq!(cfg.player.user_id, "Alex");
        assert_eq!(cfg.player.game_title, PlayerConfig::default().game_title);
        assert_eq!(cfg.server, ServerConfig::default());
        assert!(cfg.triggers.is_empty());
    }

    #[test]
    fn missing_file_is_written_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let cfg = AppConfig::load_or_init(&path).unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert!(path.exists());

        let reloaded = AppConfig::load_or_init(&path).unwrap();
        assert_eq!(reloaded, cfg);
    }

    #[test]
    fn malformed_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "[1, 2").unwrap();

        let err = AppConfig::load_or_init(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
    }

    #[test]
    fn encoding_labels_resolve() {
        let mut ingest = IngestConfig::default();
        assert_eq!(ingest.text_encoding().unwrap(), encoding_rs::GBK);

        ingest.encoding = "utf-8".to_string();
        assert_eq!(ingest.text_encoding().unwrap(), encoding_rs::UTF_8);

        ingest.encoding = "klingon".to_string();
        assert!(matches!(
            ingest.text_encoding(),
            Err(ConfigError::UnknownEncoding { .. })
        ));
    }

    #[test]
    fn durations_follow_millisecond_fields() {
        let ingest = IngestConfig::default();
        assert_eq!(ingest.poll_interval(), Duration::from_millis(200));
        assert_eq!(ingest.retry_backoff(), Duration::from_secs(2));
        assert_eq!(ingest.addr(), "127.0.0.1:25334");
        assert_eq!(ActionConfig::default().step_timeout(), Duration::from_secs(10));
    }
}
