//! Property-based tests for rust_log_shipper using proptest

use proptest::prelude::*;
use rust_log_shipper::pipeline::IntakeQueue;
use rust_log_shipper::prelude::*;
use rust_log_shipper::{Backoff, QueueStats};
use std::sync::Arc;
use std::time::Duration;

fn any_level() -> impl Strategy<Value = LogLevel> {
    prop::sample::select(LogLevel::ALL.to_vec())
}

fn any_policy() -> impl Strategy<Value = BackpressurePolicy> {
    prop_oneof![
        Just(BackpressurePolicy::DropOldest),
        Just(BackpressurePolicy::DropNewest),
        Just(BackpressurePolicy::Reject),
    ]
}

fn queue(capacity: usize, policy: BackpressurePolicy) -> (IntakeQueue, Arc<QueueStats>) {
    let stats = Arc::new(QueueStats::new());
    (IntakeQueue::new(capacity, policy, Arc::clone(&stats)), stats)
}

fn numbered(i: usize) -> LogRecord {
    LogRecord::new(LogLevel::Info, i.to_string())
}

/// One step of a simulated worker
#[derive(Debug, Clone)]
enum Op {
    Push,
    Deliver(usize),
    Fail(usize),
    Requeue(usize),
}

fn any_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Push),
        1 => (1usize..10).prop_map(Op::Deliver),
        1 => (1usize..10).prop_map(Op::Fail),
        1 => (1usize..10).prop_map(Op::Requeue),
    ]
}

// ============================================================================
// LogLevel Tests
// ============================================================================

proptest! {
    /// Wire codes and names both roundtrip
    #[test]
    fn test_log_level_code_roundtrip(level in any_level()) {
        prop_assert_eq!(LogLevel::from_code(level.code()), Some(level));
        let parsed: LogLevel = level.to_str().parse().unwrap();
        prop_assert_eq!(parsed, level);
    }

    /// Markers pass every threshold; severities pass exactly the ones at or below them
    #[test]
    fn test_level_filter_consistent_with_ordering(level in any_level(), min in any_level()) {
        if level.is_marker() || min.is_marker() {
            prop_assert!(level.passes(min));
        } else {
            prop_assert_eq!(level.passes(min), level >= min);
        }
    }

    /// Rendered messages never span more than one line
    #[test]
    fn test_sanitized_message_is_single_line(message in ".*") {
        let record = LogRecord::new(LogLevel::Info, message);
        let sanitized = record.sanitized_message();
        prop_assert!(!sanitized.contains('\n'));
        prop_assert!(!sanitized.contains('\r'));
    }
}

// ============================================================================
// Intake Queue Tests
// ============================================================================

proptest! {
    /// Under drop-oldest the queue holds the most recent `capacity` records, in order
    #[test]
    fn test_drop_oldest_keeps_newest_in_order(capacity in 1usize..50, pushes in 0usize..200) {
        let (queue, stats) = queue(capacity, BackpressurePolicy::DropOldest);
        for i in 0..pushes {
            queue.push(numbered(i)).unwrap();
        }

        let kept: Vec<String> = queue
            .take_batch(usize::MAX)
            .into_iter()
            .map(|r| r.message)
            .collect();
        let expected: Vec<String> = (pushes.saturating_sub(capacity)..pushes)
            .map(|i| i.to_string())
            .collect();

        prop_assert_eq!(kept, expected);
        prop_assert_eq!(stats.dropped() as usize, pushes.saturating_sub(capacity));
    }

    /// Refusing policies keep the oldest `capacity` records and refuse the rest
    #[test]
    fn test_refusing_policies_keep_oldest(
        capacity in 1usize..50,
        pushes in 0usize..200,
        reject in any::<bool>(),
    ) {
        let policy = if reject { BackpressurePolicy::Reject } else { BackpressurePolicy::DropNewest };
        let (queue, _stats) = queue(capacity, policy);

        let queued = (0..pushes)
            .filter(|i| queue.push(numbered(*i)).unwrap().outcome.is_queued())
            .count();

        prop_assert_eq!(queued, pushes.min(capacity));
        prop_assert!(queue.len() <= capacity);
        let first = queue.take_batch(1);
        if pushes > 0 {
            prop_assert_eq!(first[0].message.as_str(), "0");
        }
    }

    /// Every submitted record is in exactly one of queued, delivered, dropped or failed
    #[test]
    fn test_conservation_across_worker_steps(
        capacity in 1usize..20,
        policy in any_policy(),
        ops in prop::collection::vec(any_op(), 1..200),
    ) {
        let (queue, stats) = queue(capacity, policy);
        let mut next = 0;

        for op in ops {
            match op {
                Op::Push => {
                    queue.push(numbered(next)).unwrap();
                    next += 1;
                }
                Op::Deliver(n) => {
                    let batch = queue.take_batch(n);
                    stats.record_delivered(batch.len() as u64);
                }
                Op::Fail(n) => {
                    let batch = queue.take_batch(n);
                    stats.record_failed(batch.len() as u64);
                }
                Op::Requeue(n) => {
                    let batch = queue.take_batch(n);
                    queue.requeue_front(batch).unwrap();
                }
            }

            let snapshot = stats.snapshot(queue.len() as u64, 0);
            prop_assert!(snapshot.is_balanced(), "unbalanced: {:?}", snapshot);
            prop_assert_eq!(snapshot.enqueued, next as u64);
        }

        let discarded = queue.close();
        let snapshot = stats.snapshot(queue.len() as u64, 0);
        prop_assert_eq!(snapshot.queued, 0);
        prop_assert!(snapshot.is_balanced());
        prop_assert!(snapshot.dropped >= discarded);
    }

    /// A requeued batch goes back to the head in its original order
    #[test]
    fn test_requeue_preserves_order(pushes in 1usize..50, take in 1usize..50) {
        let (queue, _stats) = queue(64, BackpressurePolicy::DropOldest);
        for i in 0..pushes {
            queue.push(numbered(i)).unwrap();
        }

        let batch = queue.take_batch(take);
        queue.requeue_front(batch).unwrap();

        let all: Vec<String> = queue
            .take_batch(usize::MAX)
            .into_iter()
            .map(|r| r.message)
            .collect();
        let expected: Vec<String> = (0..pushes).map(|i| i.to_string()).collect();
        prop_assert_eq!(all, expected);
    }
}

// ============================================================================
// Backoff Tests
// ============================================================================

proptest! {
    // Most sampled inputs reach the cap and are rejected by prop_assume!
    #![proptest_config(ProptestConfig { max_global_rejects: 65_536, ..ProptestConfig::default() })]

    /// No delay ever exceeds the ceiling, whatever the jitter sample
    #[test]
    fn test_backoff_bounded_by_ceiling(
        base_ms in 1u64..5_000,
        extra_ms in 0u64..60_000,
        failures in 0u32..100,
        sample in -1.0f64..=1.0,
    ) {
        let backoff = Backoff::new(
            Duration::from_millis(base_ms),
            Duration::from_millis(base_ms + extra_ms),
        );
        prop_assert!(backoff.delay_with_jitter(failures, sample) <= backoff.ceiling());
        prop_assert!(backoff.delay(failures) <= backoff.ceiling());
    }

    /// The nominal delay never shrinks as failures accumulate
    #[test]
    fn test_backoff_nominal_non_decreasing(
        base_ms in 1u64..5_000,
        extra_ms in 0u64..60_000,
        failures in 0u32..100,
    ) {
        let backoff = Backoff::new(
            Duration::from_millis(base_ms),
            Duration::from_millis(base_ms + extra_ms),
        );
        prop_assert!(backoff.nominal(failures) <= backoff.nominal(failures + 1));
        prop_assert!(backoff.nominal(failures + 1) <= backoff.max());
    }

    /// Jittered delays never shrink while the nominal delay is below the cap
    #[test]
    fn test_backoff_jittered_non_decreasing_until_cap(
        base_ms in 1u64..5_000,
        extra_ms in 0u64..60_000,
        failures in 0u32..100,
        first in -1.0f64..=1.0,
        second in -1.0f64..=1.0,
    ) {
        let backoff = Backoff::new(
            Duration::from_millis(base_ms),
            Duration::from_millis(base_ms + extra_ms),
        );
        prop_assume!(backoff.nominal(failures) < backoff.max());
        prop_assert!(
            backoff.delay_with_jitter(failures, first)
                <= backoff.delay_with_jitter(failures + 1, second)
        );
    }
}
