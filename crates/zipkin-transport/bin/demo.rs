//! # Zipkin Transport Demo
//!
//! Pushes synthetic client/server span pairs to a running Zipkin collector.
//!
//! ## Running
//!
//! ```bash
//! # JSON v2 over HTTP to a local Zipkin
//! cargo run -p zipkin-transport --bin demo -- http://localhost:9411/api/v2/spans
//!
//! # legacy v1 endpoint, retrying transient failures
//! cargo run -p zipkin-transport --bin demo -- http://localhost:9411/api/v1/spans --v1 --retry
//!
//! # Scribe on the default port
//! cargo run -p zipkin-transport --bin demo -- --scribe localhost
//! ```
//!
//! Set `RUST_LOG=zipkin_transport=debug` to see every flush.

use anyhow::Context;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use zipkin_transport::span::now_micros;
use zipkin_transport::{
    BatchLogger, Encoding, Endpoint, HttpConfig, HttpLoggerConfig, HttpTransport, LoggerConfig,
    Reporter, RetryConfig, RetryingTransport, ScribeLoggerConfig, Span, SpanKind,
};

const SERVICES: &[&str] = &["frontend", "checkout", "inventory", "payments"];
const OPERATIONS: &[&str] = &["get", "post", "list", "charge"];

#[derive(Debug)]
struct Args {
    endpoint: String,
    scribe_host: Option<String>,
    v1: bool,
    retry: bool,
    quick: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        endpoint: "http://localhost:9411/api/v2/spans".to_owned(),
        scribe_host: None,
        v1: false,
        retry: false,
        quick: false,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--v1" => args.v1 = true,
            "--retry" => args.retry = true,
            "--quick" => args.quick = true,
            "--scribe" => {
                args.scribe_host = Some(iter.next().context("--scribe needs a host")?);
            }
            other if other.starts_with("--") => anyhow::bail!("unknown flag {other}"),
            endpoint => args.endpoint = endpoint.to_owned(),
        }
    }
    Ok(args)
}

/// One client span and the matching server span, sharing a trace.
fn span_pair(rng: &mut impl Rng) -> [Span; 2] {
    let trace_id: u128 = rng.gen_range(1..=u128::MAX);
    let client_id: u64 = rng.gen_range(1..=u64::MAX);
    let server_id: u64 = rng.gen_range(1..=u64::MAX);
    let caller = SERVICES[rng.gen_range(0..SERVICES.len())];
    let callee = SERVICES[rng.gen_range(0..SERVICES.len())];
    let operation = OPERATIONS[rng.gen_range(0..OPERATIONS.len())];

    let start = now_micros();
    let duration = rng.gen_range(500..50_000);
    let client = Span::new(trace_id, client_id)
        .with_name(operation)
        .with_kind(SpanKind::Client)
        .with_timing(start, duration)
        .with_local_endpoint(Endpoint::service(caller))
        .with_remote_endpoint(Endpoint::service(callee))
        .tag("http.path", format!("/api/{operation}"));
    let server = Span::new(trace_id, server_id)
        .with_parent(client_id)
        .with_name(operation)
        .with_kind(SpanKind::Server)
        .with_timing(start + 100, duration.saturating_sub(200))
        .with_local_endpoint(Endpoint::service(callee))
        .tag("http.status_code", "200");
    [client, server]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = parse_args()?;
    let failures = Arc::new(AtomicU64::new(0));
    let delivered = Arc::new(AtomicU64::new(0));

    let reporter = {
        let failures = Arc::clone(&failures);
        let delivered = Arc::clone(&delivered);
        Reporter::builder()
            .on_error(move |e| {
                failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "flush failed");
            })
            .on_success(move |report| {
                delivered.fetch_add(report.spans as u64, Ordering::Relaxed);
                tracing::info!(spans = report.spans, bytes = report.bytes, "flushed");
            })
            .build()
    };

    let interval = Duration::from_millis(500);
    let encoding = if args.v1 { Encoding::JsonV1 } else { Encoding::JsonV2 };
    let logger = match (&args.scribe_host, args.retry) {
        (Some(host), _) => {
            let config = ScribeLoggerConfig::new(host.clone()).with_interval(interval);
            BatchLogger::scribe(config, reporter)?
        }
        (None, false) => {
            let config = HttpLoggerConfig::new(args.endpoint.clone())
                .with_encoding(encoding)
                .with_interval(interval);
            BatchLogger::http(config, reporter)?
        }
        (None, true) => {
            let transport = HttpTransport::new(HttpConfig::new(args.endpoint.clone()))?;
            let retrying = RetryingTransport::new(transport, RetryConfig::default());
            let config = LoggerConfig::default().with_flush_interval(interval);
            BatchLogger::start(config, encoding.encoder(), retrying, reporter)?
        }
    };
    tracing::info!(?logger, "logging synthetic spans");

    let rounds = if args.quick { 4 } else { 20 };
    let mut rng = rand::thread_rng();
    for _ in 0..rounds {
        for _ in 0..rng.gen_range(5..25) {
            for span in span_pair(&mut rng) {
                logger.log_span(span);
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let metrics_enqueued = logger.metrics().spans_enqueued();
    logger.shutdown().await;

    println!();
    println!("spans logged:    {metrics_enqueued}");
    println!("spans delivered: {}", delivered.load(Ordering::Relaxed));
    println!("failed flushes:  {}", failures.load(Ordering::Relaxed));
    Ok(())
}
