//! Configuration for batching and flushing.

use crate::error::ConfigError;
use std::time::Duration;

/// Which span to discard when the pending queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Keep what is queued, discard the incoming span.
    #[default]
    DropNewest,
    /// Evict the oldest queued span to make room.
    DropOldest,
}

/// Configuration for a [`BatchLogger`](crate::BatchLogger).
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Period of the flush timer.
    ///
    /// Default: 1s
    pub flush_interval: Duration,

    /// Upper bound on pending spans between flushes.
    ///
    /// Default: 100_000
    pub max_queue_size: usize,

    /// What happens to spans logged while the queue is full.
    ///
    /// Default: [`OverflowPolicy::DropNewest`]
    pub overflow_policy: OverflowPolicy,

    /// Deadline for one transport call. A flush that exceeds it is reported
    /// as a timeout and the batch is discarded.
    ///
    /// Default: 10s
    pub export_timeout: Duration,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(1),
            max_queue_size: 100_000,
            overflow_policy: OverflowPolicy::DropNewest,
            export_timeout: Duration::from_secs(10),
        }
    }
}

impl LoggerConfig {
    /// Short interval, small queue: spans show up quickly.
    pub fn low_latency() -> Self {
        Self {
            flush_interval: Duration::from_millis(100),
            max_queue_size: 10_000,
            ..Self::default()
        }
    }

    /// Longer interval, larger batches, fewer requests.
    pub fn high_throughput() -> Self {
        Self {
            flush_interval: Duration::from_secs(5),
            max_queue_size: 1_000_000,
            export_timeout: Duration::from_secs(30),
            ..Self::default()
        }
    }

    /// Sets the flush interval.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Sets the queue bound.
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Sets the overflow policy.
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Sets the transport deadline.
    pub fn with_export_timeout(mut self, timeout: Duration) -> Self {
        self.export_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_interval.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "flush_interval",
            });
        }
        if self.export_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "export_timeout",
            });
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::ZeroQueueSize);
        }
        Ok(())
    }
}
