//! Error types for encoding, transport and configuration.

use std::time::Duration;
use thiserror::Error;

/// A batch could not be turned into a payload.
///
/// Encoding is all-or-nothing: one bad span fails the whole batch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The span breaks a rule every Zipkin format relies on
    #[error("span {index} cannot be encoded: {reason}")]
    InvalidSpan { index: usize, reason: &'static str },
    /// A string or collection exceeds what the wire format can express
    #[error("{field} too large for the wire format ({len} bytes)")]
    TooLarge { field: &'static str, len: usize },
    /// Serializer failure
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EncodeError {
    fn from(e: serde_json::Error) -> Self {
        EncodeError::Serialization(e.to_string())
    }
}

impl From<thrift::Error> for EncodeError {
    fn from(e: thrift::Error) -> Self {
        EncodeError::Serialization(e.to_string())
    }
}

/// Error types for a flush attempt.
///
/// Every variant ends up in the [`Reporter`](crate::Reporter); none of them is
/// ever returned from `log_span` or the flush timer.
#[derive(Debug, Error, Clone)]
pub enum ExportError {
    /// The claimed batch could not be encoded
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    /// Connection-oriented backends could not open their channel
    #[error("connect error: {0}")]
    Connect(String),
    /// Transport-layer error (network, protocol)
    #[error("transport error: {0}")]
    Transport(String),
    /// The collector answered outside the 2xx range
    #[error("collector responded with status {status}")]
    Status { status: u16 },
    /// Export operation timed out
    #[error("export timed out after {0:?}")]
    Timeout(Duration),
    /// The transport cannot carry this payload shape
    #[error("{transport} transport cannot send {shape} payloads")]
    UnsupportedPayload {
        transport: &'static str,
        shape: &'static str,
    },
    /// All retry attempts exhausted
    #[error("all retry attempts exhausted after {attempts} tries: {last}")]
    RetriesExhausted { attempts: u32, last: Box<ExportError> },
    /// Spans discarded because the pending queue was full
    #[error("pending queue full, dropped {dropped} span(s)")]
    QueueOverflow { dropped: u64 },
}

impl ExportError {
    /// Returns `true` if a later attempt with the same payload may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Transport(_) | Self::Timeout(_) => true,
            Self::Status { status } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Invalid configuration, detected when a logger or transport is built.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("invalid header {name:?}")]
    InvalidHeader { name: String },
    #[error("{field} must be non-zero")]
    ZeroDuration { field: &'static str },
    #[error("max_queue_size must be at least 1")]
    ZeroQueueSize,
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    /// The flush timer needs a tokio runtime to run on
    #[error("no tokio runtime available to run the flush timer")]
    NoRuntime,
}
