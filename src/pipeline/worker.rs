//! Background worker: the single consumer of the intake queue
//!
//! The worker owns the [`Connection`] exclusively. In steady state it waits
//! for records or the flush timer, ships batches, sends heartbeats when due
//! and reconnects after the backoff delay. Records are only taken from the
//! queue while the link is up; while it is down they accumulate under the
//! backpressure policy. Once the queue starts draining, the worker delivers
//! the backlog until the deadline and closes the connection.

use super::backoff::Backoff;
use super::connection::Connection;
use super::notifier::Notifier;
use super::queue::{IntakeQueue, Lifecycle};
use crate::core::{LogRecord, QueueStats, ShipperConfig, ShipperError};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Floor for idle waits, so a zero backoff cannot spin
const MIN_IDLE: Duration = Duration::from_millis(10);

/// Retry bookkeeping for the batch requeued at the head of the queue
#[derive(Debug, Clone, Copy)]
pub struct RetryContext {
    pub attempts: u32,
    pub first_attempt: Instant,
    /// Records in the failed batch
    pub len: usize,
    /// Eviction mark returned by the requeue
    pub mark: u64,
}

impl RetryContext {
    fn new(len: usize) -> Self {
        Self {
            attempts: 0,
            first_attempt: Instant::now(),
            len,
            mark: 0,
        }
    }
}

/// What the worker reports back once it stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WorkerExit {
    /// The collector acknowledged the close frame
    pub close_acknowledged: bool,
    /// Whether the collector ever refused our credentials
    pub rejected: bool,
}

pub(crate) struct Worker {
    queue: Arc<IntakeQueue>,
    connection: Connection,
    stats: Arc<QueueStats>,
    in_flight: Arc<AtomicU64>,
    notifier: Arc<Notifier>,
    backoff: Backoff,
    max_batch_size: usize,
    flush_interval: Duration,
    retry_attempts: u32,
    retry: Option<RetryContext>,
}

impl Worker {
    pub(crate) fn new(
        queue: Arc<IntakeQueue>,
        connection: Connection,
        config: &ShipperConfig,
        stats: Arc<QueueStats>,
        in_flight: Arc<AtomicU64>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            queue,
            connection,
            stats,
            in_flight,
            notifier,
            backoff: Backoff::from_config(config),
            max_batch_size: config.max_batch_size.max(1),
            flush_interval: config.flush_interval,
            retry_attempts: config.retry_attempts,
            retry: None,
        }
    }

    /// Worker thread body.
    ///
    /// The outcome of the first handshake goes to `ready` before the steady
    /// loop starts; `done` is signalled after the connection is closed.
    pub(crate) fn run(
        mut self,
        ready: Sender<std::result::Result<(), ShipperError>>,
        done: Sender<WorkerExit>,
    ) {
        let first = self.connection.handshake();
        let _ = ready.send(first);

        let deadline = loop {
            match self.queue.lifecycle() {
                Lifecycle::Open => self.step(),
                Lifecycle::Draining { deadline } => break Some(deadline),
                Lifecycle::Closed => break None,
            }
        };

        if let Some(deadline) = deadline {
            self.drain(deadline);
        }

        let close_deadline = deadline.unwrap_or_else(Instant::now);
        let close_acknowledged = self.connection.close(close_deadline);
        tracing::debug!(close_acknowledged, "worker stopped");

        let _ = done.send(WorkerExit {
            close_acknowledged,
            rejected: self.connection.rejection().is_some(),
        });
    }

    /// One steady-state iteration
    fn step(&mut self) {
        let now = Instant::now();

        if !self.connection.is_connected() {
            if self.connection.connect_due(now) {
                match self.connection.handshake() {
                    Ok(()) => return,
                    Err(e) if e.is_handshake_rejection() => {
                        self.notifier
                            .warn(&format!("{}. Shipping disabled, records stay local.", e));
                    }
                    Err(_) => {}
                }
            }
            let wait = if self.connection.rejection().is_some() {
                self.flush_interval
            } else {
                self.connection.next_attempt().saturating_duration_since(now)
            };
            self.queue.sleep(wait.max(MIN_IDLE));
            return;
        }

        if self.connection.heartbeat_due(now) {
            let _ = self.connection.heartbeat();
            return;
        }

        if let Some(batch) = self.retake_failed() {
            self.ship(batch, None);
            return;
        }

        let until_heartbeat = self.connection.next_heartbeat().saturating_duration_since(now);
        let batch = self
            .queue
            .wait_batch(self.max_batch_size, self.flush_interval.min(until_heartbeat));
        if !batch.is_empty() {
            self.ship(batch, None);
        }
    }

    /// The batch that failed last time, exactly as it was requeued.
    ///
    /// Once any of its records has been evicted the retry budget no longer
    /// belongs to what sits at the head, so it is dropped and the head is
    /// batched afresh.
    fn retake_failed(&mut self) -> Option<Vec<LogRecord>> {
        let retry = self.retry?;
        let batch = self.queue.retake(retry.len, retry.mark);
        if batch.is_none() {
            tracing::debug!(
                batch_len = retry.len,
                attempts = retry.attempts,
                "requeued batch evicted, retry budget reset"
            );
            self.retry = None;
        }
        batch
    }

    /// Deliver the backlog until the queue is empty or `deadline` passes
    fn drain(&mut self, deadline: Instant) {
        self.connection.set_deadline(Some(deadline));
        tracing::debug!(queued = self.queue.len(), "draining intake queue");

        loop {
            let now = Instant::now();
            if now >= deadline || self.queue.is_empty() {
                break;
            }
            if self.queue.lifecycle() == Lifecycle::Closed {
                break;
            }

            if !self.connection.is_connected() {
                if self.connection.rejection().is_some() {
                    break;
                }
                if self.connection.connect_due(now) {
                    let _ = self.connection.handshake();
                } else {
                    let wait = self
                        .connection
                        .next_attempt()
                        .min(deadline)
                        .saturating_duration_since(now);
                    self.queue.sleep(wait.max(MIN_IDLE).min(deadline - now));
                }
                continue;
            }

            let batch = match self.retake_failed() {
                Some(batch) => batch,
                None => self.queue.take_batch(self.max_batch_size),
            };
            if batch.is_empty() {
                break;
            }
            self.ship(batch, Some(deadline));
        }

        tracing::debug!(remaining = self.queue.len(), "drain finished");
    }

    /// Transmit one batch and settle its records: delivered, requeued for
    /// another attempt, or failed
    fn ship(&mut self, batch: Vec<LogRecord>, deadline: Option<Instant>) {
        let len = batch.len() as u64;
        self.in_flight.store(len, Ordering::Relaxed);

        let error = match self.connection.send_batch(&batch) {
            Ok(()) => {
                self.stats.record_delivered(len);
                self.in_flight.store(0, Ordering::Relaxed);
                self.retry = None;
                return;
            }
            Err(e) => e,
        };

        let mut retry = self
            .retry
            .take()
            .unwrap_or_else(|| RetryContext::new(batch.len()));
        retry.attempts += 1;
        let attempts = retry.attempts;

        if attempts < self.retry_attempts {
            self.stats.record_retry();
            let delay = self.backoff.delay(attempts);
            tracing::debug!(
                error = %error,
                batch_len = len,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "batch delivery failed, requeueing"
            );

            match self.queue.requeue_front(batch) {
                Ok(mark) => {
                    retry.mark = mark;
                    self.retry = Some(retry);
                }
                Err(records) => {
                    // Closed underneath us; nothing will ever send these
                    self.stats.record_dropped(records.len() as u64);
                }
            }
            self.in_flight.store(0, Ordering::Relaxed);

            let pause = match deadline {
                Some(deadline) => delay.min(deadline.saturating_duration_since(Instant::now())),
                None => delay,
            };
            if !pause.is_zero() {
                self.queue.sleep(pause);
            }
        } else {
            let elapsed = retry.first_attempt.elapsed();
            self.stats.record_failed(len);
            self.in_flight.store(0, Ordering::Relaxed);
            self.notifier.warn(&format!(
                "Giving up on batch of {} records after {} attempts over {:?}: {}",
                len, attempts, elapsed, error
            ));
        }
    }
}
