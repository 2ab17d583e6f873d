use std::collections::VecDeque;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use encoding_rs::Encoding;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};

use super::{decode_line, LineSource};
use crate::config::IngestConfig;
use crate::error::{ConfigError, IngestError};

/// Tails a growing text file by polling its size.
///
/// The offset starts at the end of the file, so only lines appended after the
/// first poll are produced. A trailing partial line is held back until its
/// newline arrives. When the file shrinks the offset resets to zero.
#[derive(Debug)]
pub struct FileTail {
    path: PathBuf,
    encoding: &'static Encoding,
    poll_interval: Duration,
    offset: Option<u64>,
    pending: VecDeque<String>,
}

impl FileTail {
    /// Creates a tail over `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, encoding: &'static Encoding, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            encoding,
            poll_interval,
            offset: None,
            pending: VecDeque::new(),
        }
    }

    /// Creates a tail from the ingestion settings.
    pub fn from_config(cfg: &IngestConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(cfg.log_path.clone(), cfg.text_encoding()?, cfg.poll_interval()))
    }

    /// The tailed path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of the next unread line, once the file has been opened.
    #[must_use]
    pub const fn offset(&self) -> Option<u64> {
        self.offset
    }

    async fn file_len(&self) -> Result<u64, IngestError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.len()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(IngestError::FileMissing {
                path: self.path.clone(),
            }),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn io_error(&self, source: std::io::Error) -> IngestError {
        IngestError::Io {
            target: self.path.display().to_string(),
            source,
        }
    }

    /// Reads whatever was appended since the last poll into `pending`.
    async fn poll(&mut self) -> Result<(), IngestError> {
        let len = self.file_len().await?;
        let Some(offset) = self.offset else {
            info!(path = %self.path.display(), offset = len, "tailing log file");
            self.offset = Some(len);
            return Ok(());
        };

        if len < offset {
            debug!(path = %self.path.display(), "log file shrank, rewinding");
            self.offset = Some(0);
            return Ok(());
        }
        if len == offset {
            return Ok(());
        }

        let mut file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| self.io_error(e))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.map_err(|e| self.io_error(e))?;

        let Some(last_newline) = buf.iter().rposition(|b| *b == b'\n') else {
            return Ok(());
        };
        let complete = &buf[..=last_newline];
        for raw in complete.split_inclusive(|b| *b == b'\n') {
            let line = decode_line(self.encoding, raw);
            if !line.is_empty() {
                self.pending.push_back(line);
            }
        }
        self.offset = Some(offset + complete.len() as u64);
        Ok(())
    }
}

#[async_trait]
impl LineSource for FileTail {
    fn describe(&self) -> String {
        format!("file({})", self.path.display())
    }

    async fn next_line(&mut self) -> Result<Option<String>, IngestError> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Ok(Some(line));
            }
            let before = self.offset;
            self.poll().await?;
            if self.pending.is_empty() && before.is_some() {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }
}
