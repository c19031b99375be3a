//! Outcome reporting for flush attempts.
//!
//! A [`Reporter`] decides once, when it is built, where failures go: to the
//! registered error observers if there are any, otherwise to an [`ErrorLog`].
//! It is a fan-out, never a buffer.

use crate::error::ExportError;
use std::sync::Arc;
use std::time::Duration;

/// Stable message used for every failed flush.
pub const FLUSH_ERROR_MESSAGE: &str = "Error sending Zipkin data";

/// What a successful flush delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    /// Spans in the delivered batch
    pub spans: usize,
    /// Encoded payload size in bytes
    pub bytes: usize,
    /// Encode + transport time
    pub elapsed: Duration,
}

pub type ErrorObserver = Arc<dyn Fn(&ExportError) + Send + Sync>;
pub type SuccessObserver = Arc<dyn Fn(&FlushReport) + Send + Sync>;

/// Fallback sink for failures nobody observes.
pub trait ErrorLog: Send + Sync {
    fn error(&self, message: &str, error: &ExportError);
}

/// Default [`ErrorLog`]: one `tracing` error event per failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl ErrorLog for TracingLog {
    fn error(&self, message: &str, error: &ExportError) {
        tracing::error!(error = %error, "{}", message);
    }
}

enum ErrorSink {
    Observers(Vec<ErrorObserver>),
    Log(Arc<dyn ErrorLog>),
    Discard,
}

/// Routes flush outcomes to the host application.
pub struct Reporter {
    errors: ErrorSink,
    successes: Vec<SuccessObserver>,
}

impl Reporter {
    pub fn builder() -> ReporterBuilder {
        ReporterBuilder::default()
    }

    /// Signals a failed flush.
    pub fn error(&self, error: &ExportError) {
        match &self.errors {
            ErrorSink::Observers(observers) => {
                for observer in observers {
                    observer(error);
                }
            }
            ErrorSink::Log(log) => log.error(FLUSH_ERROR_MESSAGE, error),
            ErrorSink::Discard => {}
        }
    }

    /// Signals a delivered batch. No observers is not an error.
    pub fn success(&self, report: &FlushReport) {
        for observer in &self.successes {
            observer(report);
        }
    }

    /// Returns `true` if failures reach at least one error observer.
    pub fn has_error_observers(&self) -> bool {
        matches!(self.errors, ErrorSink::Observers(_))
    }
}

impl Default for Reporter {
    /// No observers, failures logged through [`TracingLog`].
    fn default() -> Self {
        Reporter::builder().build()
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let errors = match &self.errors {
            ErrorSink::Observers(o) => format!("{} observer(s)", o.len()),
            ErrorSink::Log(_) => "log".to_owned(),
            ErrorSink::Discard => "discard".to_owned(),
        };
        f.debug_struct("Reporter")
            .field("errors", &errors)
            .field("successes", &self.successes.len())
            .finish()
    }
}

/// Collects observers before the reporter is frozen.
pub struct ReporterBuilder {
    error_observers: Vec<ErrorObserver>,
    success_observers: Vec<SuccessObserver>,
    log: Option<Arc<dyn ErrorLog>>,
}

impl Default for ReporterBuilder {
    fn default() -> Self {
        Self {
            error_observers: Vec::new(),
            success_observers: Vec::new(),
            log: Some(Arc::new(TracingLog)),
        }
    }
}

impl ReporterBuilder {
    /// Registers an error observer. Once any is registered, failures are no
    /// longer logged.
    pub fn on_error(mut self, f: impl Fn(&ExportError) + Send + Sync + 'static) -> Self {
        self.error_observers.push(Arc::new(f));
        self
    }

    /// Registers a success observer.
    pub fn on_success(mut self, f: impl Fn(&FlushReport) + Send + Sync + 'static) -> Self {
        self.success_observers.push(Arc::new(f));
        self
    }

    /// Replaces the fallback log.
    pub fn log(mut self, log: impl ErrorLog + 'static) -> Self {
        self.log = Some(Arc::new(log));
        self
    }

    /// Removes the fallback log; unobserved failures are then dropped.
    pub fn without_log(mut self) -> Self {
        self.log = None;
        self
    }

    pub fn build(self) -> Reporter {
        let errors = if !self.error_observers.is_empty() {
            ErrorSink::Observers(self.error_observers)
        } else if let Some(log) = self.log {
            ErrorSink::Log(log)
        } else {
            ErrorSink::Discard
        };
        Reporter {
            errors,
            successes: self.success_observers,
        }
    }
}
