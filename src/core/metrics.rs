//! Pipeline counters for observability
//!
//! `QueueStats` tracks where every submitted record ended up; the
//! conservation law `enqueued == delivered + dropped + failed + queued +
//! in_flight` holds once the pipeline is quiescent. Counters are plain
//! relaxed atomics: a snapshot is point-in-time per field and offers no
//! cross-field consistency while records are moving.
//!
//! `ConnectionMetrics` tracks the collector link.

use super::log_level::LogLevel;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const LEVELS: usize = LogLevel::ALL.len();

/// Record accounting shared by producers, the intake queue and the worker
///
/// # Example
///
/// ```
/// use rust_log_shipper::QueueStats;
///
/// use rust_log_shipper::LogLevel;
///
/// let stats = QueueStats::new();
/// stats.record_enqueued(LogLevel::Info);
/// stats.record_enqueued(LogLevel::Error);
/// stats.record_dropped(1);
/// stats.record_delivered(1);
///
/// let snapshot = stats.snapshot(0, 0);
/// assert_eq!(snapshot.enqueued, 2);
/// assert_eq!(snapshot.enqueued_at(LogLevel::Error), 1);
/// assert!(snapshot.is_balanced());
/// ```
#[derive(Debug)]
pub struct QueueStats {
    /// Records submitted to the intake queue, accepted or not
    enqueued: AtomicU64,

    /// Records evicted, refused, or discarded at shutdown
    dropped: AtomicU64,

    /// Records acknowledged by the collector
    delivered: AtomicU64,

    /// Records given up on after exhausting their batch retries
    failed: AtomicU64,

    /// Batch resend attempts
    retried: AtomicU64,

    /// Submissions per level, indexed by [`LogLevel::index`]
    by_level: [AtomicU64; LEVELS],

    /// Acknowledged batches
    batches_delivered: AtomicU64,

    /// High-water mark of the intake queue length
    peak_queued: AtomicU64,
}

impl QueueStats {
    pub fn new() -> Self {
        Self {
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            by_level: std::array::from_fn(|_| AtomicU64::new(0)),
            batches_delivered: AtomicU64::new(0),
            peak_queued: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn retried(&self) -> u64 {
        self.retried.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn enqueued_at(&self, level: LogLevel) -> u64 {
        self.by_level[level.index()].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn peak_queued(&self) -> u64 {
        self.peak_queued.load(Ordering::Relaxed)
    }

    /// Record a submitted record; returns the previous count
    #[inline]
    pub fn record_enqueued(&self, level: LogLevel) -> u64 {
        self.by_level[level.index()].fetch_add(1, Ordering::Relaxed);
        self.enqueued.fetch_add(1, Ordering::Relaxed)
    }

    /// Raise the queue high-water mark to `len` if it is higher
    #[inline]
    pub fn record_queue_len(&self, len: usize) {
        self.peak_queued.fetch_max(len as u64, Ordering::Relaxed);
    }

    /// Record dropped records; returns the previous count
    #[inline]
    pub fn record_dropped(&self, count: u64) -> u64 {
        self.dropped.fetch_add(count, Ordering::Relaxed)
    }

    /// Record one acknowledged batch of `count` records
    #[inline]
    pub fn record_delivered(&self, count: u64) -> u64 {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
        self.delivered.fetch_add(count, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_failed(&self, count: u64) -> u64 {
        self.failed.fetch_add(count, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_retry(&self) -> u64 {
        self.retried.fetch_add(1, Ordering::Relaxed)
    }

    /// Point-in-time copy of the counters.
    ///
    /// `queued` and `in_flight` are gauges owned by the queue and the worker;
    /// the caller supplies them.
    pub fn snapshot(&self, queued: u64, in_flight: u64) -> StatsSnapshot {
        StatsSnapshot {
            enqueued: self.enqueued(),
            dropped: self.dropped(),
            delivered: self.delivered(),
            failed: self.failed(),
            retried: self.retried(),
            queued,
            in_flight,
            enqueued_by_level: std::array::from_fn(|i| self.by_level[i].load(Ordering::Relaxed)),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            peak_queued: self.peak_queued(),
        }
    }
}

impl Default for QueueStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of [`QueueStats`] plus the queue gauges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub enqueued: u64,
    pub dropped: u64,
    pub delivered: u64,
    pub failed: u64,
    pub retried: u64,
    /// Records waiting in the intake queue
    pub queued: u64,
    /// Records held by the worker in the batch being transmitted
    pub in_flight: u64,
    /// Submissions per level, indexed by [`LogLevel::index`]
    pub enqueued_by_level: [u64; LEVELS],
    pub batches_delivered: u64,
    /// Longest the intake queue has been
    pub peak_queued: u64,
}

impl StatsSnapshot {
    /// Records that have not reached a terminal state yet
    pub fn pending(&self) -> u64 {
        self.queued + self.in_flight
    }

    /// Conservation check: every submitted record is accounted for exactly once
    pub fn is_balanced(&self) -> bool {
        self.enqueued == self.delivered + self.dropped + self.failed + self.pending()
    }

    pub fn enqueued_at(&self, level: LogLevel) -> u64 {
        self.enqueued_by_level[level.index()]
    }

    /// Mean records per acknowledged batch, 0.0 before the first one
    pub fn average_batch_size(&self) -> f64 {
        if self.batches_delivered == 0 {
            0.0
        } else {
            self.delivered as f64 / self.batches_delivered as f64
        }
    }

    /// Drop rate as a percentage (0.0 - 100.0)
    ///
    /// Returns 0.0 if nothing has been submitted.
    pub fn drop_rate(&self) -> f64 {
        if self.enqueued == 0 {
            0.0
        } else {
            (self.dropped as f64 / self.enqueued as f64) * 100.0
        }
    }
}

/// Counters for the collector link
///
/// Link uptime is tracked as millisecond offsets from the moment the
/// metrics were created, so every field stays a plain atomic.
#[derive(Debug)]
pub struct ConnectionMetrics {
    origin: Instant,
    connect_attempts: AtomicU64,
    handshakes: AtomicU64,
    reconnects: AtomicU64,
    heartbeats_sent: AtomicU64,
    heartbeats_missed: AtomicU64,
    batches_sent: AtomicU64,
    batches_rejected: AtomicU64,
    transport_errors: AtomicU64,
    state_changes: AtomicU64,
    /// Duration of the most recent successful handshake
    last_handshake_ms: AtomicU64,
    /// Offset of the current link's handshake plus one; zero while down
    connected_at: AtomicU64,
    /// Uptime of links that have already ended
    connected_ms: AtomicU64,
}

impl ConnectionMetrics {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            connect_attempts: AtomicU64::new(0),
            handshakes: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            heartbeats_sent: AtomicU64::new(0),
            heartbeats_missed: AtomicU64::new(0),
            batches_sent: AtomicU64::new(0),
            batches_rejected: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            state_changes: AtomicU64::new(0),
            last_handshake_ms: AtomicU64::new(0),
            connected_at: AtomicU64::new(0),
            connected_ms: AtomicU64::new(0),
        }
    }

    fn offset_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    #[inline]
    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed handshake that took `latency`; the link counts
    /// as up from here until [`record_link_down`](Self::record_link_down)
    pub fn record_handshake(&self, latency: Duration) {
        self.handshakes.fetch_add(1, Ordering::Relaxed);
        self.last_handshake_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
        self.connected_at
            .store(self.offset_ms() + 1, Ordering::Relaxed);
    }

    /// Close the current uptime window, if one is open
    pub fn record_link_down(&self) {
        let since = self.connected_at.swap(0, Ordering::Relaxed);
        if since > 0 {
            let uptime = self.offset_ms().saturating_sub(since - 1);
            self.connected_ms.fetch_add(uptime, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_heartbeat(&self) {
        self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_heartbeat_missed(&self) {
        self.heartbeats_missed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_batch_sent(&self) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_batch_rejected(&self) {
        self.batches_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_state_change(&self) {
        self.state_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let since = self.connected_at.load(Ordering::Relaxed);
        let uptime_ms = if since > 0 {
            self.offset_ms().saturating_sub(since - 1)
        } else {
            0
        };

        ConnectionSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            handshakes: self.handshakes.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
            heartbeats_missed: self.heartbeats_missed.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            batches_rejected: self.batches_rejected.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            state_changes: self.state_changes.load(Ordering::Relaxed),
            last_handshake_ms: self.last_handshake_ms.load(Ordering::Relaxed),
            uptime_ms,
            connected_ms: self.connected_ms.load(Ordering::Relaxed) + uptime_ms,
        }
    }
}

impl Default for ConnectionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub connect_attempts: u64,
    pub handshakes: u64,
    pub reconnects: u64,
    pub heartbeats_sent: u64,
    pub heartbeats_missed: u64,
    pub batches_sent: u64,
    /// Batches the collector answered with a nack
    pub batches_rejected: u64,
    /// Sends or receives that tore the link down
    pub transport_errors: u64,
    pub state_changes: u64,
    /// How long the most recent successful handshake took
    pub last_handshake_ms: u64,
    /// Age of the current link, zero while disconnected
    pub uptime_ms: u64,
    /// Total time connected, current link included
    pub connected_ms: u64,
}

impl ConnectionSnapshot {
    /// Percentage of connection attempts that completed a handshake
    pub fn success_rate(&self) -> f64 {
        if self.connect_attempts == 0 {
            0.0
        } else {
            (self.handshakes as f64 / self.connect_attempts as f64) * 100.0
        }
    }
}
