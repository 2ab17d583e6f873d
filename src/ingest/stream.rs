use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use encoding_rs::Encoding;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tracing::{info, warn};

use super::{decode_line, FileTail, LineSource};
use crate::config::IngestConfig;
use crate::error::{ConfigError, IngestError};

enum StreamState {
    Connecting,
    Connected(BufReader<TcpStream>),
    Degraded(FileTail),
    Finished,
}

/// Reads line-delimited text from a forwarding endpoint.
///
/// Connection failures are retried with a fixed backoff. The attempt budget
/// covers the whole session: once it is spent the source switches to tailing
/// the log file and never tries the stream again. A clean close by the remote
/// side ends the source.
pub struct StreamSource {
    addr: String,
    encoding: &'static Encoding,
    retry_limit: u32,
    retry_backoff: Duration,
    fallback_path: PathBuf,
    poll_interval: Duration,
    attempts: u32,
    state: StreamState,
}

impl std::fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSource")
            .field("addr", &self.addr)
            .field("attempts", &self.attempts)
            .field("degraded", &self.is_degraded())
            .finish_non_exhaustive()
    }
}

impl StreamSource {
    /// Creates a stream source from the ingestion settings.
    pub fn from_config(cfg: &IngestConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            addr: cfg.addr(),
            encoding: cfg.text_encoding()?,
            retry_limit: cfg.retry_limit,
            retry_backoff: cfg.retry_backoff(),
            fallback_path: cfg.log_path.clone(),
            poll_interval: cfg.poll_interval(),
            attempts: 0,
            state: StreamState::Connecting,
        })
    }

    /// Connection attempts made so far.
    #[must_use]
    pub const fn connect_attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the source has fallen back to the file tail.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self.state, StreamState::Degraded(_))
    }

    async fn connect(&mut self) {
        while self.attempts < self.retry_limit {
            self.attempts += 1;
            match TcpStream::connect(&self.addr).await {
                Ok(stream) => {
                    info!(addr = %self.addr, "connected to log stream");
                    self.state = StreamState::Connected(BufReader::new(stream));
                    return;
                }
                Err(err) => {
                    let err = connect_error(&self.addr, err);
                    warn!(
                        addr = %self.addr,
                        attempt = self.attempts,
                        limit = self.retry_limit,
                        error = %err,
                        "log stream connection failed"
                    );
                    if !err.is_retryable() {
                        break;
                    }
                    if self.attempts < self.retry_limit {
                        tokio::time::sleep(self.retry_backoff).await;
                    }
                }
            }
        }

        warn!(
            addr = %self.addr,
            path = %self.fallback_path.display(),
            "log stream unavailable, falling back to file tail"
        );
        self.state = StreamState::Degraded(FileTail::new(
            self.fallback_path.clone(),
            self.encoding,
            self.poll_interval,
        ));
    }
}

/// Classifies a failed connect. Refusals, resets and timeouts may clear up on
/// a later attempt; anything else (bad address, permissions) will not.
fn connect_error(addr: &str, err: std::io::Error) -> IngestError {
    use std::io::ErrorKind;

    match err.kind() {
        ErrorKind::ConnectionRefused
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::TimedOut
        | ErrorKind::NotConnected
        | ErrorKind::AddrNotAvailable
        | ErrorKind::Interrupted
        | ErrorKind::WouldBlock => IngestError::ConnectionFailed {
            addr: addr.to_string(),
            message: err.to_string(),
        },
        _ => IngestError::Io {
            target: addr.to_string(),
            source: err,
        },
    }
}

#[async_trait]
impl LineSource for StreamSource {
    fn describe(&self) -> String {
        match &self.state {
            StreamState::Degraded(tail) => format!("stream({}) -> {}", self.addr, tail.describe()),
            _ => format!("stream({})", self.addr),
        }
    }

    async fn next_line(&mut self) -> Result<Option<String>, IngestError> {
        let mut buf = Vec::new();
        loop {
            if matches!(self.state, StreamState::Connecting) {
                self.connect().await;
                continue;
            }
            match &mut self.state {
                StreamState::Connecting => {}
                StreamState::Connected(reader) => {
                    buf.clear();
                    match reader.read_until(b'\n', &mut buf).await {
                        Ok(0) => {
                            info!(addr = %self.addr, "log stream closed by remote");
                            self.state = StreamState::Finished;
                        }
                        Ok(_) => {
                            let line = decode_line(self.encoding, &buf);
                            if !line.is_empty() {
                                return Ok(Some(line));
                            }
                        }
                        Err(source) => {
                            let err = IngestError::Io {
                                target: self.addr.clone(),
                                source,
                            };
                            warn!(error = %err, "log stream read failed, reconnecting");
                            self.state = StreamState::Connecting;
                        }
                    }
                }
                StreamState::Degraded(tail) => return tail.next_line().await,
                StreamState::Finished => return Ok(None),
            }
        }
    }
}
