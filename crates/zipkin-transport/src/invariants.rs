//! Debug assertion macros for batch queue invariants.
//!
//! Only active in debug builds (`debug_assert!`), so there is no cost in
//! release builds.

// =============================================================================
// INV-QUEUE-01: Bounded Pending Queue
// =============================================================================

/// Assert that the pending queue never exceeds its bound.
///
/// **Invariant**: `len ≤ max_queue_size`
///
/// Used in: `BatchQueue::enqueue()` after the push
macro_rules! debug_assert_queue_bounded {
    ($len:expr, $capacity:expr) => {
        debug_assert!(
            $len <= $capacity,
            "INV-QUEUE-01 violated: {} pending spans exceed bound {}",
            $len,
            $capacity
        )
    };
}

// =============================================================================
// INV-QUEUE-02: Claim Empties The Queue
// =============================================================================

/// Assert that a claim left nothing behind.
///
/// **Invariant**: `claim() → pending.is_empty()` (checked under the same lock)
///
/// Used in: `BatchQueue::claim()` before releasing the lock
macro_rules! debug_assert_claim_cleared {
    ($remaining:expr) => {
        debug_assert!(
            $remaining == 0,
            "INV-QUEUE-02 violated: {} spans left behind after claim",
            $remaining
        )
    };
}

// =============================================================================
// INV-SCHED-01: At Most One Flush In Flight
// =============================================================================

/// Assert that the scheduler never starts a second export.
///
/// **Invariant**: `in_flight ≤ 1` at the moment a new export is spawned
///
/// Used in: the scheduler tick before `JoinSet::spawn`
macro_rules! debug_assert_single_in_flight {
    ($in_flight:expr) => {
        debug_assert!(
            $in_flight == 0,
            "INV-SCHED-01 violated: spawning an export while {} still in flight",
            $in_flight
        )
    };
}

pub(crate) use debug_assert_claim_cleared;
pub(crate) use debug_assert_queue_bounded;
pub(crate) use debug_assert_single_in_flight;
