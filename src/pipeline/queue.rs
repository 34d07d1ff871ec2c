//! Bounded intake queue between producers and the worker
//!
//! Many producers push, exactly one worker pops. Producers never wait on
//! anything but the queue mutex; a full queue is resolved immediately by the
//! backpressure policy. The worker waits on a condition variable that is
//! signalled by new records and by lifecycle changes (drain, close).

use crate::core::{BackpressurePolicy, EnqueueOutcome, LogRecord, QueueStats, Result, ShipperError};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle of the intake queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Accepting records
    Open,
    /// No new records; the worker delivers the backlog until `deadline`
    Draining { deadline: Instant },
    /// Terminal; the backlog has been delivered or discarded
    Closed,
}

/// Result of a push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub outcome: EnqueueOutcome,
    /// Records this call cost (evicted or refused)
    pub drops: u64,
    /// Dropped counter after this call
    pub total_dropped: u64,
}

struct Inner {
    records: VecDeque<LogRecord>,
    lifecycle: Lifecycle,
    /// Bumped on every lifecycle change so sleepers can tell
    generation: u64,
    /// Records evicted from the head by drop-oldest admission
    evictions: u64,
}

pub struct IntakeQueue {
    inner: Mutex<Inner>,
    signal: Condvar,
    capacity: usize,
    policy: BackpressurePolicy,
    stats: Arc<QueueStats>,
}

impl IntakeQueue {
    pub fn new(capacity: usize, policy: BackpressurePolicy, stats: Arc<QueueStats>) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                records: VecDeque::with_capacity(capacity),
                lifecycle: Lifecycle::Open,
                generation: 0,
                evictions: 0,
            }),
            signal: Condvar::new(),
            capacity,
            policy,
            stats,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> BackpressurePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.lock().lifecycle
    }

    /// Hand a record to the pipeline; never blocks beyond the queue mutex.
    ///
    /// While draining, records are refused and counted as dropped. Once
    /// closed, pushing is a caller error.
    pub fn push(&self, record: LogRecord) -> Result<Admission> {
        let mut inner = self.inner.lock();
        let level = record.level;

        let (outcome, drops) = match inner.lifecycle {
            Lifecycle::Closed => return Err(ShipperError::Closed),
            Lifecycle::Draining { .. } => (EnqueueOutcome::Rejected, 1),
            Lifecycle::Open if inner.records.len() < self.capacity => {
                inner.records.push_back(record);
                (EnqueueOutcome::Accepted, 0)
            }
            Lifecycle::Open => match self.policy {
                BackpressurePolicy::DropOldest => {
                    // A requeued batch may have pushed the queue past capacity
                    let mut evicted = 0;
                    while inner.records.len() >= self.capacity {
                        inner.records.pop_front();
                        evicted += 1;
                    }
                    inner.evictions += evicted;
                    inner.records.push_back(record);
                    (EnqueueOutcome::DroppedOldest, evicted)
                }
                BackpressurePolicy::DropNewest => (EnqueueOutcome::DroppedNewest, 1),
                BackpressurePolicy::Reject => (EnqueueOutcome::Rejected, 1),
            },
        };

        self.stats.record_enqueued(level);
        self.stats.record_queue_len(inner.records.len());
        let total_dropped = if drops > 0 {
            self.stats.record_dropped(drops) + drops
        } else {
            self.stats.dropped()
        };
        drop(inner);

        if outcome.is_queued() {
            self.signal.notify_one();
        }

        Ok(Admission {
            outcome,
            drops,
            total_dropped,
        })
    }

    /// Take up to `max` records without waiting
    pub fn take_batch(&self, max: usize) -> Vec<LogRecord> {
        let mut inner = self.inner.lock();
        Self::split_front(&mut inner.records, max)
    }

    /// Wait until at least one record is queued, the lifecycle changes, or
    /// `timeout` elapses; then take up to `max` records.
    pub fn wait_batch(&self, max: usize, timeout: Duration) -> Vec<LogRecord> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        let generation = inner.generation;

        while inner.records.is_empty() && inner.generation == generation {
            if self.signal.wait_until(&mut inner, deadline).timed_out() {
                break;
            }
        }

        Self::split_front(&mut inner.records, max)
    }

    /// Put records back at the head, in their original order.
    ///
    /// Capacity is not enforced here: a batch coming back from a failed
    /// transmission must not evict itself. Returns an eviction mark for
    /// [`retake`](Self::retake), or the records if the queue is already
    /// closed.
    pub fn requeue_front(&self, records: Vec<LogRecord>) -> std::result::Result<u64, Vec<LogRecord>> {
        let mut inner = self.inner.lock();
        if inner.lifecycle == Lifecycle::Closed {
            return Err(records);
        }
        for record in records.into_iter().rev() {
            inner.records.push_front(record);
        }
        let len = inner.records.len();
        self.stats.record_queue_len(len);
        Ok(inner.evictions)
    }

    /// Take back exactly `len` records requeued under `mark`.
    ///
    /// `None` when any record has been evicted from the head since, in which
    /// case the head no longer holds the requeued batch intact. The queue is
    /// left untouched then.
    pub fn retake(&self, len: usize, mark: u64) -> Option<Vec<LogRecord>> {
        let mut inner = self.inner.lock();
        if inner.evictions != mark || inner.records.len() < len {
            return None;
        }
        Some(Self::split_front(&mut inner.records, len))
    }

    /// Sleep for `duration` unless the lifecycle changes first
    pub fn sleep(&self, duration: Duration) -> Lifecycle {
        let deadline = Instant::now() + duration;
        let mut inner = self.inner.lock();
        let generation = inner.generation;

        while inner.generation == generation {
            if self.signal.wait_until(&mut inner, deadline).timed_out() {
                break;
            }
        }
        inner.lifecycle
    }

    /// Stop accepting records and let the worker drain until `deadline`.
    ///
    /// Returns false when the queue is not open.
    pub fn begin_drain(&self, deadline: Instant) -> bool {
        let mut inner = self.inner.lock();
        if inner.lifecycle != Lifecycle::Open {
            return false;
        }
        inner.lifecycle = Lifecycle::Draining { deadline };
        inner.generation += 1;
        drop(inner);
        self.signal.notify_all();
        true
    }

    /// Close for good, discarding whatever is left; returns the number of
    /// records discarded (counted as dropped).
    pub fn close(&self) -> u64 {
        let mut inner = self.inner.lock();
        let discarded = inner.records.len() as u64;
        inner.records.clear();
        if inner.lifecycle != Lifecycle::Closed {
            inner.lifecycle = Lifecycle::Closed;
            inner.generation += 1;
        }
        if discarded > 0 {
            self.stats.record_dropped(discarded);
        }
        drop(inner);
        self.signal.notify_all();
        discarded
    }

    fn split_front(records: &mut VecDeque<LogRecord>, max: usize) -> Vec<LogRecord> {
        let count = records.len().min(max);
        records.drain(..count).collect()
    }
}
