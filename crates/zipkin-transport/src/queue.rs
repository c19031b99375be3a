//! Pending Queue - bounded, claim-and-clear buffer
//!
//! The queue is the only shared mutable state between producers and the
//! flush path. Producers append with [`BatchQueue::enqueue`]; the flush path
//! takes everything at once with [`BatchQueue::claim`]. Both run under one
//! short lock, so a span is either in the current claim or left for the next
//! one, never both.
//!
//! The queue never looks inside a record: `T` is opaque here.

use crate::config::OverflowPolicy;
use crate::invariants::{debug_assert_claim_cleared, debug_assert_queue_bounded};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// What happened to a span passed to [`BatchQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Appended, nothing lost
    Queued,
    /// Appended after evicting the oldest pending span
    EvictedOldest,
    /// Queue full, the new span was discarded
    Rejected,
}

struct Pending<T> {
    spans: VecDeque<T>,
    /// Spans discarded since the last `take_dropped`
    dropped: u64,
}

/// Bounded pending queue with atomic claim.
pub struct BatchQueue<T> {
    pending: Mutex<Pending<T>>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl<T> BatchQueue<T> {
    /// Creates a queue holding at most `capacity` spans (minimum 1).
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            pending: Mutex::new(Pending {
                spans: VecDeque::new(),
                dropped: 0,
            }),
            capacity: capacity.max(1),
            policy,
        }
    }

    /// Appends a span. Never blocks on I/O and never fails; overflow is
    /// resolved by the configured policy and counted.
    pub fn enqueue(&self, span: T) -> EnqueueOutcome {
        let mut pending = self.pending.lock();
        let outcome = if pending.spans.len() < self.capacity {
            pending.spans.push_back(span);
            EnqueueOutcome::Queued
        } else {
            pending.dropped += 1;
            match self.policy {
                OverflowPolicy::DropNewest => EnqueueOutcome::Rejected,
                OverflowPolicy::DropOldest => {
                    pending.spans.pop_front();
                    pending.spans.push_back(span);
                    EnqueueOutcome::EvictedOldest
                }
            }
        };
        debug_assert_queue_bounded!(pending.spans.len(), self.capacity);
        outcome
    }

    /// Takes every pending span, in enqueue order, and leaves the queue
    /// empty. Returns `None` if there was nothing to take.
    pub fn claim(&self) -> Option<Vec<T>> {
        let mut pending = self.pending.lock();
        if pending.spans.is_empty() {
            return None;
        }
        let batch: Vec<T> = std::mem::take(&mut pending.spans).into();
        debug_assert_claim_cleared!(pending.spans.len());
        Some(batch)
    }

    /// Returns and resets the number of spans dropped on overflow.
    pub fn take_dropped(&self) -> u64 {
        std::mem::take(&mut self.pending.lock().dropped)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().spans.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
