//! Zipkin Span Transport
//!
//! Batches completed spans and delivers them to a Zipkin collector on a
//! timer, without ever blocking the code that records them.
//!
//! - [`BatchLogger`] queues spans (`log_span` is synchronous and infallible)
//!   and flushes them on a fixed interval: claim, encode, send, report.
//! - [`Encoder`]s turn a batch into a [`Payload`]: JSON v1, JSON v2 or one
//!   Thrift struct per span.
//! - [`Transport`]s deliver a payload: HTTP POST, or Scribe over a framed
//!   Thrift TCP connection.
//! - The [`Reporter`] routes failures to observers, or to a fallback log when
//!   nobody observes them.
//!
//! Delivery is at most once: a batch that fails to encode or send is reported
//! and discarded. Wrap a transport in [`RetryingTransport`] to retry transient
//! failures.
//!
//! # Example
//!
//! ```ignore
//! use zipkin_transport::{BatchLogger, Encoding, HttpLoggerConfig, Reporter, Span};
//!
//! let reporter = Reporter::builder()
//!     .on_error(|e| eprintln!("zipkin: {e}"))
//!     .build();
//! let config = HttpLoggerConfig::new("http://localhost:9411/api/v2/spans")
//!     .with_encoding(Encoding::JsonV2);
//! let logger = BatchLogger::http(config, reporter)?;
//!
//! logger.log_span(Span::new(trace_id, span_id).with_name("get"));
//! logger.shutdown().await;
//! ```

pub mod config;
pub mod encoder;
pub mod error;
mod invariants;
pub mod logger;
pub mod queue;
pub mod reporter;
pub mod retry;
mod scheduler;
pub mod span;
pub mod transport;

// Re-export main types
pub use config::{LoggerConfig, OverflowPolicy};
pub use encoder::{Encoder, Encoding, JsonV1Encoder, JsonV2Encoder, Payload, ThriftEncoder};
pub use error::{ConfigError, EncodeError, ExportError};
pub use logger::{BatchLogger, FlushMetrics, FlushOutcome, HttpLoggerConfig, ScribeLoggerConfig};
pub use queue::{BatchQueue, EnqueueOutcome};
pub use reporter::{
    ErrorLog, FlushReport, Reporter, ReporterBuilder, TracingLog, FLUSH_ERROR_MESSAGE,
};
pub use retry::{RetryConfig, RetryingTransport};
pub use span::{Annotation, Endpoint, Span, SpanKind};
pub use transport::{
    HttpConfig, HttpTransport, ReconnectPolicy, ScribeClient, ScribeConfig, ScribeTransport,
    TcpScribeClient, Transport, TransportBoxed, DEFAULT_CATEGORY, DEFAULT_SCRIBE_PORT,
};
