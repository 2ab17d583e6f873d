//! Ingestion sources.
//!
//! A source produces decoded text lines, one at a time, until it ends or
//! fails. Two strategies ship with the crate: [`FileTail`] polls a growing
//! log file and [`StreamSource`] reads a line-delimited TCP stream, degrading
//! to a file tail once its connection retries are exhausted.

use std::borrow::Cow;
use std::collections::VecDeque;

use async_trait::async_trait;
use encoding_rs::Encoding;

use crate::config::{IngestConfig, IngestMode};
use crate::error::{ConfigError, IngestError};

/// Polled file strategy.
pub mod file;
/// TCP stream strategy with file fallback.
pub mod stream;

pub use file::FileTail;
pub use stream::StreamSource;

/// A producer of raw log lines.
#[async_trait]
pub trait LineSource: Send {
    /// Human-readable description used in diagnostics.
    fn describe(&self) -> String;

    /// Returns the next line, or `None` once the source has ended.
    async fn next_line(&mut self) -> Result<Option<String>, IngestError>;
}

/// Builds the source selected by `cfg.mode`.
pub fn source_from_config(cfg: &IngestConfig) -> Result<Box<dyn LineSource>, ConfigError> {
    let source: Box<dyn LineSource> = match cfg.mode {
        IngestMode::File => Box::new(FileTail::from_config(cfg)?),
        IngestMode::Stream => Box::new(StreamSource::from_config(cfg)?),
    };
    Ok(source)
}

/// In-memory source that yields a fixed list of lines and then ends.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    lines: VecDeque<String>,
}

impl ReplaySource {
    /// Creates a source over `lines`.
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Lines not yet produced.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

#[async_trait]
impl LineSource for ReplaySource {
    fn describe(&self) -> String {
        format!("replay({} lines)", self.lines.len())
    }

    async fn next_line(&mut self) -> Result<Option<String>, IngestError> {
        Ok(self.lines.pop_front())
    }
}

/// Decodes one raw line, replacing malformed sequences, and strips the line ending.
pub(crate) fn decode_line(encoding: &'static Encoding, raw: &[u8]) -> String {
    let (text, _had_errors) = encoding.decode_without_bom_handling(raw);
    match text {
        Cow::Borrowed(s) => s.trim_end().to_string(),
        Cow::Owned(mut s) => {
            let len = s.trim_end().len();
            s.truncate(len);
            s
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replay_source_yields_in_order_then_ends() {
        let mut source = ReplaySource::new(["first", "second"]);
        assert_eq!(source.next_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(source.next_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(source.next_line().await.unwrap(), None);
        assert_eq!(source.remaining(), 0);
    }

    #[test]
    fn decode_line_handles_gbk_and_replaces_garbage() {
        let (raw, _, _) = encoding_rs::GBK.encode("悄悄话\r\n");
        assert_eq!(decode_line(encoding_rs::GBK, &raw), "悄悄话");

        let decoded = decode_line(encoding_rs::UTF_8, b"ok \xff\n");
        assert_eq!(decoded, "ok \u{fffd}");
    }

    #[test]
    fn unknown_encoding_is_rejected_at_build_time() {
        let cfg = IngestConfig {
            encoding: "not-a-charset".to_string(),
            ..IngestConfig::default()
        };
        assert!(matches!(
            source_from_config(&cfg),
            Err(ConfigError::UnknownEncoding { .. })
        ));
    }
}
