//! The batch logger: public entry point tying queue, encoder, transport and
//! reporter together.
//!
//! ```text
//! log_span ──► BatchQueue ──tick──► claim ──► encode ──► send ──► Reporter
//! ```
//!
//! `log_span` only touches the queue. Everything after the claim runs on the
//! flush path and can only end in a [`FlushOutcome`] plus a reporter event.

use crate::config::LoggerConfig;
use crate::encoder::{Encoder, Encoding};
use crate::error::{ConfigError, ExportError};
use crate::queue::{BatchQueue, EnqueueOutcome};
use crate::reporter::{FlushReport, Reporter};
use crate::scheduler::FlushScheduler;
use crate::span::Span;
use crate::transport::{
    HttpConfig, HttpTransport, ScribeConfig, ScribeTransport, TcpScribeClient, Transport,
    TransportBoxed, DEFAULT_CATEGORY,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Result of one flush attempt.
#[derive(Debug, Clone)]
pub enum FlushOutcome {
    /// Nothing was pending; no encoder or transport call was made
    Empty,
    /// The batch reached the backend
    Delivered { spans: usize },
    /// The batch was discarded; the error was already reported
    Failed(ExportError),
}

impl FlushOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, FlushOutcome::Delivered { .. })
    }
}

/// Thread-safe flush counters (atomics, updated from the flush task).
#[derive(Debug, Default)]
pub struct FlushMetrics {
    spans_enqueued: AtomicU64,
    spans_dropped: AtomicU64,
    spans_exported: AtomicU64,
    batches_exported: AtomicU64,
    export_errors: AtomicU64,
    skipped_ticks: AtomicU64,
}

impl FlushMetrics {
    pub fn spans_enqueued(&self) -> u64 {
        self.spans_enqueued.load(Ordering::Relaxed)
    }

    /// Spans discarded by the overflow policy
    pub fn spans_dropped(&self) -> u64 {
        self.spans_dropped.load(Ordering::Relaxed)
    }

    pub fn spans_exported(&self) -> u64 {
        self.spans_exported.load(Ordering::Relaxed)
    }

    pub fn batches_exported(&self) -> u64 {
        self.batches_exported.load(Ordering::Relaxed)
    }

    pub fn export_errors(&self) -> u64 {
        self.export_errors.load(Ordering::Relaxed)
    }

    /// Timer ticks skipped because a flush was still in flight
    pub fn skipped_ticks(&self) -> u64 {
        self.skipped_ticks.load(Ordering::Relaxed)
    }

    fn record_enqueue(&self, outcome: EnqueueOutcome) {
        match outcome {
            EnqueueOutcome::Queued => {
                self.spans_enqueued.fetch_add(1, Ordering::Relaxed);
            }
            EnqueueOutcome::EvictedOldest => {
                self.spans_enqueued.fetch_add(1, Ordering::Relaxed);
                self.spans_dropped.fetch_add(1, Ordering::Relaxed);
            }
            EnqueueOutcome::Rejected => {
                self.spans_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn record_success(&self, spans: usize) {
        self.spans_exported.fetch_add(spans as u64, Ordering::Relaxed);
        self.batches_exported.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.export_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped_tick(&self) {
        self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
    }
}

/// State shared between the logger handle and the flush timer task.
pub(crate) struct FlushCore<T> {
    queue: BatchQueue<T>,
    encoder: Box<dyn Encoder<T>>,
    transport: Arc<dyn TransportBoxed>,
    reporter: Reporter,
    export_timeout: Duration,
    metrics: FlushMetrics,
}

impl<T: Send + 'static> FlushCore<T> {
    /// Takes the pending batch. Overflow drops accumulated since the last
    /// claim are reported first, as one event.
    pub(crate) fn claim(&self) -> Option<Vec<T>> {
        let dropped = self.queue.take_dropped();
        if dropped > 0 {
            tracing::warn!(dropped, "pending queue overflowed");
            self.reporter.error(&ExportError::QueueOverflow { dropped });
        }
        self.queue.claim()
    }

    /// Encodes and sends a claimed batch, then reports the outcome.
    /// The batch is gone afterwards whatever happened.
    pub(crate) async fn export(&self, batch: Vec<T>) -> FlushOutcome {
        let started = Instant::now();
        let spans = batch.len();

        let payload = match self.encoder.encode(&batch) {
            Ok(payload) => payload,
            Err(e) => return self.fail(e.into()),
        };
        drop(batch);
        let bytes = payload.byte_len();

        let send = self.transport.send_boxed(payload);
        let sent = tokio::time::timeout(self.export_timeout, send).await;
        match sent {
            Ok(Ok(())) => {
                self.metrics.record_success(spans);
                let report = FlushReport {
                    spans,
                    bytes,
                    elapsed: started.elapsed(),
                };
                tracing::debug!(
                    transport = self.transport.name(),
                    spans,
                    bytes,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "batch delivered"
                );
                self.reporter.success(&report);
                FlushOutcome::Delivered { spans }
            }
            Ok(Err(e)) => self.fail(e),
            Err(_) => self.fail(ExportError::Timeout(self.export_timeout)),
        }
    }

    /// Claim, then export. Returns `Empty` without touching the encoder or
    /// transport when nothing is pending.
    pub(crate) async fn flush(&self) -> FlushOutcome {
        match self.claim() {
            Some(batch) => self.export(batch).await,
            None => FlushOutcome::Empty,
        }
    }

    pub(crate) fn metrics(&self) -> &FlushMetrics {
        &self.metrics
    }

    fn fail(&self, error: ExportError) -> FlushOutcome {
        self.metrics.record_error();
        tracing::debug!(
            transport = self.transport.name(),
            encoder = self.encoder.name(),
            error = %error,
            "flush failed, batch discarded"
        );
        self.reporter.error(&error);
        FlushOutcome::Failed(error)
    }
}

/// Batches spans and delivers them to a backend on a timer.
///
/// `log_span` never blocks on I/O and never fails. Delivery is at most once
/// per span: a batch that fails to encode or send is reported and discarded.
///
/// # Example
///
/// ```ignore
/// let config = HttpLoggerConfig::new("http://localhost:9411/api/v1/spans");
/// let logger = BatchLogger::http(config, Reporter::default())?;
/// logger.log_span(span);
/// logger.shutdown().await;
/// ```
pub struct BatchLogger<T> {
    core: Arc<FlushCore<T>>,
    scheduler: Option<FlushScheduler>,
}

impl<T: Send + 'static> BatchLogger<T> {
    /// Builds a logger and starts its flush timer on the current tokio
    /// runtime. The first flush happens one interval after start.
    pub fn start(
        config: LoggerConfig,
        encoder: impl Encoder<T> + 'static,
        transport: impl Transport + 'static,
        reporter: Reporter,
    ) -> Result<Self, ConfigError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        let mut logger = Self::manual(config.clone(), encoder, transport, reporter)?;
        logger.scheduler = Some(FlushScheduler::start(
            Arc::clone(&logger.core),
            config.flush_interval,
            &runtime,
        ));
        tracing::debug!(
            interval_ms = config.flush_interval.as_millis() as u64,
            max_queue_size = config.max_queue_size,
            "batch logger started"
        );
        Ok(logger)
    }

    /// Builds a logger without a timer; batches only go out on
    /// [`flush`](Self::flush) or [`shutdown`](Self::shutdown).
    pub fn manual(
        config: LoggerConfig,
        encoder: impl Encoder<T> + 'static,
        transport: impl Transport + 'static,
        reporter: Reporter,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let core = FlushCore {
            queue: BatchQueue::new(config.max_queue_size, config.overflow_policy),
            encoder: Box::new(encoder),
            transport: Arc::new(transport),
            reporter,
            export_timeout: config.export_timeout,
            metrics: FlushMetrics::default(),
        };
        Ok(Self {
            core: Arc::new(core),
            scheduler: None,
        })
    }

    /// Queues a span for the next flush.
    pub fn log_span(&self, span: T) {
        let outcome = self.core.queue.enqueue(span);
        self.core.metrics.record_enqueue(outcome);
    }

    /// Flushes whatever is pending right now.
    pub async fn flush(&self) -> FlushOutcome {
        self.core.flush().await
    }

    /// Spans waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.core.queue.len()
    }

    pub fn metrics(&self) -> &FlushMetrics {
        self.core.metrics()
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Stops the timer, waits for an in-flight flush, then drains the queue
    /// with one last flush.
    pub async fn shutdown(mut self) -> FlushOutcome {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown().await;
        }
        let outcome = self.core.flush().await;
        tracing::debug!(?outcome, "batch logger shut down");
        outcome
    }
}

impl<T> std::fmt::Debug for BatchLogger<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchLogger")
            .field("transport", &self.core.transport.name())
            .field("encoder", &self.core.encoder.name())
            .field("reporter", &self.core.reporter)
            .field("scheduled", &self.scheduler.is_some())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// ZIPKIN LOGGERS
// =============================================================================

/// Settings for a span logger posting to a Zipkin HTTP collector.
#[derive(Debug, Clone)]
pub struct HttpLoggerConfig {
    pub http: HttpConfig,
    /// Default: [`Encoding::JsonV1`]
    pub encoding: Encoding,
    pub logger: LoggerConfig,
}

impl HttpLoggerConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: HttpConfig::new(endpoint),
            encoding: Encoding::JsonV1,
            logger: LoggerConfig::default(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.http = self.http.with_header(name, value);
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.logger.flush_interval = interval;
        self
    }

    pub fn with_logger_config(mut self, logger: LoggerConfig) -> Self {
        self.logger = logger;
        self
    }
}

/// Settings for a span logger writing Thrift spans to Scribe.
#[derive(Debug, Clone)]
pub struct ScribeLoggerConfig {
    pub scribe: ScribeConfig,
    /// Default: `"zipkin"`
    pub category: String,
    pub logger: LoggerConfig,
}

impl ScribeLoggerConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            scribe: ScribeConfig::new(host),
            category: DEFAULT_CATEGORY.to_owned(),
            logger: LoggerConfig::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.scribe.port = port;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.logger.flush_interval = interval;
        self
    }

    pub fn with_logger_config(mut self, logger: LoggerConfig) -> Self {
        self.logger = logger;
        self
    }
}

impl BatchLogger<Span> {
    /// A started logger posting batches to a Zipkin HTTP endpoint.
    pub fn http(config: HttpLoggerConfig, reporter: Reporter) -> Result<Self, ConfigError> {
        let transport = HttpTransport::new(config.http)?;
        Self::start(config.logger, config.encoding.encoder(), transport, reporter)
    }

    /// A started logger sending base64 Thrift spans over Scribe.
    pub fn scribe(config: ScribeLoggerConfig, reporter: Reporter) -> Result<Self, ConfigError> {
        if config.scribe.connect_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "connect_timeout",
            });
        }
        let client = TcpScribeClient::new(config.scribe);
        let transport = ScribeTransport::with_category(client, config.category);
        Self::start(config.logger, Encoding::Thrift.encoder(), transport, reporter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverflowPolicy;
    use crate::encoder::{Payload, CONTENT_TYPE_JSON};
    use crate::error::EncodeError;
    use crate::reporter::testing::RecordingLog;
    use crate::span::SpanKind;
    use crate::transport::testing::{FailingTransport, RecordingTransport, SlowTransport};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    /// Joins the records with commas, counting calls.
    #[derive(Clone, Default)]
    struct CsvEncoder {
        calls: Arc<AtomicUsize>,
    }

    impl Encoder<u32> for CsvEncoder {
        fn encode(&self, spans: &[u32]) -> Result<Payload, EncodeError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let body = spans.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
            Ok(Payload::Document {
                content_type: CONTENT_TYPE_JSON,
                body: body.into_bytes(),
            })
        }

        fn name(&self) -> &str {
            "csv"
        }
    }

    struct BrokenEncoder;

    impl Encoder<u32> for BrokenEncoder {
        fn encode(&self, _spans: &[u32]) -> Result<Payload, EncodeError> {
            Err(EncodeError::Serialization("boom".into()))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn body(payload: &Payload) -> String {
        match payload {
            Payload::Document { body, .. } => String::from_utf8(body.clone()).unwrap(),
            Payload::Messages(_) => panic!("expected a document"),
        }
    }

    fn manual(transport: impl Transport + 'static, reporter: Reporter) -> BatchLogger<u32> {
        BatchLogger::manual(LoggerConfig::default(), CsvEncoder::default(), transport, reporter)
            .unwrap()
    }

    #[tokio::test]
    async fn test_flush_delivers_in_order() {
        let transport = RecordingTransport::default();
        let logger = manual(transport.clone(), Reporter::default());

        for i in 1..=3 {
            logger.log_span(i);
        }
        let outcome = logger.flush().await;

        assert!(matches!(outcome, FlushOutcome::Delivered { spans: 3 }));
        assert_eq!(body(&transport.payloads.lock()[0]), "1,2,3");
        assert_eq!(logger.pending(), 0);
        assert_eq!(logger.metrics().spans_exported(), 3);
        assert_eq!(logger.metrics().batches_exported(), 1);
    }

    #[tokio::test]
    async fn test_empty_flush_calls_nothing() {
        let encoder = CsvEncoder::default();
        let calls = encoder.calls.clone();
        let transport = RecordingTransport::default();
        let logger = BatchLogger::manual(
            LoggerConfig::default(),
            encoder,
            transport.clone(),
            Reporter::default(),
        )
        .unwrap();

        assert!(matches!(logger.flush().await, FlushOutcome::Empty));
        assert_eq!(calls.load(Ordering::Relaxed), 0);
        assert_eq!(transport.sent(), 0);
    }

    #[tokio::test]
    async fn test_failed_batch_not_requeued() {
        let transport = FailingTransport::default();
        let log = RecordingLog::default();
        let logger = manual(transport.clone(), Reporter::builder().log(log.clone()).build());

        logger.log_span(1);
        assert!(matches!(
            logger.flush().await,
            FlushOutcome::Failed(ExportError::Status { status: 500 })
        ));
        assert_eq!(logger.pending(), 0);

        // nothing left to retry
        assert!(matches!(logger.flush().await, FlushOutcome::Empty));
        assert_eq!(transport.attempts.load(Ordering::Relaxed), 1);
        assert_eq!(log.count(), 1);
        assert_eq!(logger.metrics().export_errors(), 1);
    }

    #[tokio::test]
    async fn test_encode_failure_skips_transport() {
        let transport = RecordingTransport::default();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let reporter = Reporter::builder()
            .on_error(move |e| sink.lock().push(e.clone()))
            .build();
        let logger =
            BatchLogger::manual(LoggerConfig::default(), BrokenEncoder, transport.clone(), reporter)
                .unwrap();

        logger.log_span(1);
        let outcome = logger.flush().await;

        assert!(matches!(outcome, FlushOutcome::Failed(ExportError::Encode(_))));
        assert_eq!(transport.sent(), 0);
        assert_eq!(errors.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_unrepresentable_span_reaches_reporter() {
        for encoding in [Encoding::JsonV1, Encoding::Thrift] {
            let transport = RecordingTransport::default();
            let errors = Arc::new(Mutex::new(Vec::new()));
            let sink = errors.clone();
            let reporter = Reporter::builder()
                .on_error(move |e| sink.lock().push(e.clone()))
                .build();
            let logger = BatchLogger::manual(
                LoggerConfig::default(),
                encoding.encoder(),
                transport.clone(),
                reporter,
            )
            .unwrap();

            logger.log_span(
                Span::new(1, 2)
                    .with_kind(SpanKind::Client)
                    .with_timing(u64::MAX - 1, 5),
            );
            let outcome = logger.flush().await;

            assert!(matches!(
                outcome,
                FlushOutcome::Failed(ExportError::Encode(EncodeError::InvalidSpan { index: 0, .. }))
            ));
            assert_eq!(transport.sent(), 0);
            assert_eq!(errors.lock().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_success_observer_gets_report() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        let reporter = Reporter::builder()
            .on_success(move |r| sink.lock().push(r.clone()))
            .build();
        let logger = manual(RecordingTransport::default(), reporter);

        logger.log_span(10);
        logger.log_span(20);
        logger.flush().await;

        let reports = reports.lock();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].spans, 2);
        assert_eq!(reports[0].bytes, "10,20".len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_timeout_reported() {
        let transport = SlowTransport {
            delay: Duration::from_secs(60),
            inner: RecordingTransport::default(),
        };
        let config = LoggerConfig::default().with_export_timeout(Duration::from_secs(1));
        let log = RecordingLog::default();
        let logger = BatchLogger::manual(
            config,
            CsvEncoder::default(),
            transport.clone(),
            Reporter::builder().log(log.clone()).build(),
        )
        .unwrap();

        logger.log_span(1);
        let outcome = logger.flush().await;

        assert!(matches!(
            outcome,
            FlushOutcome::Failed(ExportError::Timeout(d)) if d == Duration::from_secs(1)
        ));
        assert_eq!(transport.inner.sent(), 0);
        assert_eq!(log.count(), 1);
    }

    #[tokio::test]
    async fn test_overflow_reported_once_per_flush() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let reporter = Reporter::builder()
            .on_error(move |e| sink.lock().push(e.clone()))
            .build();
        let config = LoggerConfig::default()
            .with_max_queue_size(2)
            .with_overflow_policy(OverflowPolicy::DropNewest);
        let transport = RecordingTransport::default();
        let logger = BatchLogger::manual(config, CsvEncoder::default(), transport.clone(), reporter)
            .unwrap();

        for i in 0..5 {
            logger.log_span(i);
        }
        assert_eq!(logger.metrics().spans_dropped(), 3);
        assert_eq!(logger.metrics().spans_enqueued(), 2);

        assert!(logger.flush().await.is_delivered());
        assert_eq!(body(&transport.payloads.lock()[0]), "0,1");
        {
            let errors = errors.lock();
            assert_eq!(errors.len(), 1);
            assert!(matches!(errors[0], ExportError::QueueOverflow { dropped: 3 }));
        }

        // counter was reset by the report
        logger.log_span(9);
        logger.flush().await;
        assert_eq!(errors.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_manual_shutdown_drains() {
        let transport = RecordingTransport::default();
        let logger = manual(transport.clone(), Reporter::default());
        assert!(!logger.is_scheduled());

        logger.log_span(7);
        let outcome = logger.shutdown().await;

        assert!(matches!(outcome, FlushOutcome::Delivered { spans: 1 }));
        assert_eq!(transport.sent(), 1);
    }

    #[test]
    fn test_start_without_runtime_fails() {
        let err = BatchLogger::start(
            LoggerConfig::default(),
            CsvEncoder::default(),
            RecordingTransport::default(),
            Reporter::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::NoRuntime));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = LoggerConfig::default().with_flush_interval(Duration::ZERO);
        let err = BatchLogger::manual(
            config,
            CsvEncoder::default(),
            RecordingTransport::default(),
            Reporter::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroDuration { field: "flush_interval" }));
    }

    #[tokio::test]
    async fn test_http_logger_rejects_bad_endpoint() {
        let err = BatchLogger::http(HttpLoggerConfig::new("localhost:9411"), Reporter::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));
    }
}
