//! Error types for mcreact.
//!
//! All errors are strongly typed using thiserror, one enum per concern.
//! Configuration errors are fatal and only surface at startup; everything
//! else is isolated to the line, task or action that produced it.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal configuration errors raised while building the pipeline.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid pattern for event kind '{kind}': {reason}")]
    InvalidPattern {
        kind: String,
        reason: String,
    },

    #[error("Event kind '{kind}' is already registered")]
    DuplicateKind {
        kind: String,
    },

    #[error("Payload type {payload} is already bound to event kind '{kind}'")]
    DuplicatePayload {
        payload: String,
        kind: String,
    },

    #[error("No ingestion source registered")]
    NoIngestionSource,

    #[error("Unknown text encoding '{label}'")]
    UnknownEncoding {
        label: String,
    },

    #[error("Invalid trigger rule #{index}: {reason}")]
    InvalidTrigger {
        index: usize,
        reason: String,
    },
}

/// Classification diagnostics. These never escape the classifier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("Event '{kind}' captured fields {actual:?}, expected {expected:?}")]
    FieldMismatch {
        kind: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Event kind '{kind}' is not registered")]
    UnregisteredKind {
        kind: String,
    },

    #[error("Event '{kind}' is missing field '{field}'")]
    MissingField {
        kind: String,
        field: String,
    },

    #[error("Event '{kind}' field '{field}' has invalid value '{value}'")]
    InvalidField {
        kind: String,
        field: String,
        value: String,
    },
}

/// Errors raised by ingestion sources.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Log file not found: {path}")]
    FileMissing {
        path: PathBuf,
    },

    #[error("I/O error on {target}: {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection to {addr} failed: {message}")]
    ConnectionFailed {
        addr: String,
        message: String,
    },
}

impl IngestError {
    /// Returns true if trying the same endpoint again may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. })
    }
}

/// Invalid action builder state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Chat content cannot be empty")]
    EmptyContent,

    #[error("Recipient cannot be empty")]
    EmptyRecipient,

    #[error("Land name cannot be empty")]
    EmptyLandName,

    #[error("Amount must be positive, got {amount}")]
    NonPositiveAmount {
        amount: i64,
    },

    #[error("'{operation}' requires a preceding '{requires}'")]
    OutOfOrder {
        operation: String,
        requires: String,
    },

    #[error("Sub-command is not set for '{command}'")]
    Incomplete {
        command: String,
    },

    #[error("Method '{method}' is not exported by action '{action}'")]
    NotAllowed {
        action: String,
        method: String,
    },

    #[error("Invalid argument for '{method}': {reason}")]
    InvalidArgument {
        method: String,
        reason: String,
    },
}

/// Errors resolving an action request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("Action '{action}' failed: {message}")]
    Failed {
        action: String,
        message: String,
    },

    #[error("Action '{action}' panicked")]
    Panicked {
        action: String,
    },

    #[error("Timed out after {duration_ms}ms waiting for action")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Action chain timed out after {duration_ms}ms")]
    ChainTimeout {
        duration_ms: u64,
    },

    #[error("Action queue is closed")]
    QueueClosed,

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Errors returned by reactors and named handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The designated shutdown signal: the scheduler drains when it sees it.
    #[error("Terminate requested: {reason}")]
    Terminate {
        reason: String,
    },

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("{message}")]
    Other {
        message: String,
    },
}

impl HandlerError {
    /// Creates the terminate signal.
    #[must_use]
    pub fn terminate(reason: impl Into<String>) -> Self {
        Self::Terminate {
            reason: reason.into(),
        }
    }

    /// Creates a generic handler failure.
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Returns true if this is the terminate signal.
    #[must_use]
    pub const fn is_terminate(&self) -> bool {
        matches!(self, Self::Terminate { .. })
    }
}

/// Top-level error type for mcreact.
#[derive(Debug, Error)]
pub enum McError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),
}

impl McError {
    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this error carries the terminate signal.
    #[must_use]
    pub const fn is_terminate(&self) -> bool {
        matches!(self, Self::Handler(HandlerError::Terminate { .. }))
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Config(_) => false,
            Self::Ingest(e) => e.is_retryable(),
            Self::Action(e) => matches!(e, ActionError::Timeout { .. } | ActionError::ChainTimeout { .. }),
            Self::Handler(_) => false,
        }
    }
}

/// Result type alias for mcreact operations.
pub type McResult<T> = Result<T, McError>;
