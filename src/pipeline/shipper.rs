//! Shipper facade: the public entry point of the pipeline

use super::connection::Connection;
use super::notifier::Notifier;
use super::queue::{IntakeQueue, Lifecycle};
use super::state::{AtomicConnectionState, ConnectionState};
use super::worker::{Worker, WorkerExit};
use crate::appenders::ConsoleAppender;
use crate::core::{
    Appender, ConnectionMetrics, ConnectionSnapshot, DropCallback, EnqueueOutcome, LogLevel,
    LogRecord, Payload, QueueStats, Result, ShipperConfig, ShipperError, StatsSnapshot,
};
use crate::transport::{Transport, WebSocketTransport};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default drain deadline when a shipper is dropped without an explicit
/// `drain_and_close` (5 seconds)
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Extra time granted to the worker past the drain deadline before it is
/// abandoned
const CLOSE_GRACE: Duration = Duration::from_millis(200);

/// Extra time granted to the worker thread to report the first handshake
const STARTUP_GRACE: Duration = Duration::from_millis(500);

/// Text of a separator line
pub const SEPARATOR: &str = "--------------------------------------------------";

/// Result of the blocking handshake performed by `start`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// The collector acknowledged the handshake
    Connected,
    /// No credentials configured; local-only mode, no network activity
    NoCredentials,
    /// The collector refused the credentials; local-only mode, no retries
    Rejected { reason: String },
    /// The collector could not be reached in time; records are queued and
    /// the worker keeps reconnecting in the background
    Unreachable { reason: String },
}

impl HandshakeOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, HandshakeOutcome::Connected)
    }

    /// Whether records will never leave the process
    pub fn is_local_only(&self) -> bool {
        matches!(
            self,
            HandshakeOutcome::NoCredentials | HandshakeOutcome::Rejected { .. }
        )
    }
}

impl fmt::Display for HandshakeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeOutcome::Connected => write!(f, "connected"),
            HandshakeOutcome::NoCredentials => write!(f, "no credentials (local-only)"),
            HandshakeOutcome::Rejected { reason } => write!(f, "rejected: {}", reason),
            HandshakeOutcome::Unreachable { reason } => write!(f, "unreachable: {}", reason),
        }
    }
}

/// How `drain_and_close` ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every queued record reached a terminal state before the deadline and
    /// the connection closed
    Clean,
    /// The deadline passed; `dropped` records were still queued and discarded
    TimedOut { dropped: u64 },
    /// Nothing could be delivered (no credentials, or credentials rejected);
    /// `dropped` records were discarded
    LocalOnly { dropped: u64 },
    /// An earlier call already closed the shipper
    AlreadyClosed,
}

impl DrainOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, DrainOutcome::Clean)
    }
}

struct WorkerHandle {
    thread: JoinHandle<()>,
    done: Receiver<WorkerExit>,
}

struct Shutdown {
    worker: Option<WorkerHandle>,
    finished: bool,
}

/// Non-blocking log shipper.
///
/// Records handed to the shipper are rendered locally, then queued for a
/// background worker that batches them to the collector. All methods take
/// `&self`; share the shipper across threads with an `Arc`.
///
/// # Example
///
/// ```
/// use rust_log_shipper::prelude::*;
/// use std::time::Duration;
///
/// // No credentials: local-only mode, no network activity
/// let config = ShipperConfig::builder().console_output(false).build();
/// let shipper = Shipper::start(config).unwrap();
/// assert_eq!(*shipper.handshake(), HandshakeOutcome::NoCredentials);
///
/// shipper.info("service started");
/// shipper.sep(Some("startup"));
///
/// let outcome = shipper.drain_and_close(Duration::from_secs(1));
/// assert!(matches!(outcome, DrainOutcome::LocalOnly { .. }));
/// ```
pub struct Shipper {
    queue: Arc<IntakeQueue>,
    stats: Arc<QueueStats>,
    in_flight: Arc<AtomicU64>,
    state: Arc<AtomicConnectionState>,
    connection_metrics: Arc<ConnectionMetrics>,
    notifier: Arc<Notifier>,
    handshake: HandshakeOutcome,
    min_level: LogLevel,
    shutdown: Mutex<Shutdown>,
}

impl Shipper {
    #[must_use]
    pub fn builder() -> ShipperBuilder {
        ShipperBuilder::new()
    }

    /// Validate `config`, spawn the worker and perform the blocking initial
    /// handshake.
    ///
    /// Only an invalid configuration is an error; an unreachable or
    /// rejecting collector is reported as a warning and through
    /// [`handshake`](Self::handshake).
    pub fn start(config: ShipperConfig) -> Result<Self> {
        ShipperBuilder::new().config(config).start()
    }

    /// Outcome of the initial handshake
    pub fn handshake(&self) -> &HandshakeOutcome {
        &self.handshake
    }

    /// Current state of the collector link, as published by the worker
    pub fn connection_state(&self) -> ConnectionState {
        self.state.load()
    }

    pub fn connection_metrics(&self) -> ConnectionSnapshot {
        self.connection_metrics.snapshot()
    }

    /// Point-in-time record accounting; fields are individually consistent
    /// only
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(
            self.queue.len() as u64,
            self.in_flight.load(Ordering::Relaxed),
        )
    }

    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    /// Render `record` locally, then queue it for delivery.
    ///
    /// Never blocks on the network. A full queue is resolved by the
    /// backpressure policy and reported in the outcome; records offered
    /// while draining are `Rejected`. The only error is
    /// [`ShipperError::Closed`] once `drain_and_close` has completed.
    pub fn enqueue(&self, record: LogRecord) -> Result<EnqueueOutcome> {
        if self.queue.lifecycle() == Lifecycle::Closed {
            return Err(ShipperError::Closed);
        }

        self.notifier.render(&record);
        let admission = self.queue.push(record)?;

        // Without credentials nothing is ever sent, so drops are expected
        if admission.drops > 0 && self.handshake != HandshakeOutcome::NoCredentials {
            self.notifier.report_drops(
                admission.drops,
                admission.total_dropped,
                self.queue.policy(),
            );
        }
        Ok(admission.outcome)
    }

    /// Level-filtered [`enqueue`](Self::enqueue); failures are reported as
    /// warnings instead of returned
    pub fn emit(&self, record: LogRecord) {
        if !record.level.passes(self.min_level) {
            return;
        }
        if let Err(e) = self.enqueue(record) {
            self.notifier.warn(&format!("Record discarded: {}", e));
        }
    }

    #[inline]
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(LogRecord::new(level, message));
    }

    pub fn log_with_payload(&self, level: LogLevel, message: impl Into<String>, payload: Payload) {
        self.emit(LogRecord::new(level, message).with_payload(payload));
    }

    #[inline]
    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    #[inline]
    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    #[inline]
    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    #[inline]
    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    #[inline]
    pub fn critical(&self, message: impl Into<String>) {
        self.log(LogLevel::Critical, message);
    }

    #[inline]
    pub fn success(&self, message: impl Into<String>) {
        self.log(LogLevel::Success, message);
    }

    #[inline]
    pub fn failure(&self, message: impl Into<String>) {
        self.log(LogLevel::Failure, message);
    }

    /// Emit a separator line at INFO, optionally labelled
    pub fn sep(&self, name: Option<&str>) {
        match name {
            Some(name) => self.info(format!("{} {}", SEPARATOR, name)),
            None => self.info(SEPARATOR),
        }
    }

    /// Stop accepting records, deliver the backlog and close the connection.
    ///
    /// Blocks until the worker has closed the connection or `timeout` has
    /// elapsed (plus a small fixed grace), whichever comes first. Records
    /// still queued at that point are dropped. Calling it again is a no-op
    /// returning [`DrainOutcome::AlreadyClosed`].
    ///
    /// # Example
    ///
    /// ```
    /// use rust_log_shipper::prelude::*;
    /// use std::time::Duration;
    ///
    /// let shipper = Shipper::start(ShipperConfig::builder().console_output(false).build()).unwrap();
    /// shipper.drain_and_close(Duration::from_secs(2));
    /// assert_eq!(shipper.drain_and_close(Duration::from_secs(2)), DrainOutcome::AlreadyClosed);
    /// ```
    pub fn drain_and_close(&self, timeout: Duration) -> DrainOutcome {
        let mut shutdown = self.shutdown.lock();
        if shutdown.finished {
            return DrainOutcome::AlreadyClosed;
        }
        shutdown.finished = true;

        let deadline = Instant::now() + timeout;
        self.queue.begin_drain(deadline);
        tracing::debug!(queued = self.queue.len(), timeout_ms = timeout.as_millis() as u64, "drain started");

        let outcome = match shutdown.worker.take() {
            Some(handle) => self.join_worker(handle, deadline),
            None => {
                let dropped = self.queue.close();
                self.state.store(ConnectionState::Closed);
                DrainOutcome::LocalOnly { dropped }
            }
        };

        if let DrainOutcome::TimedOut { dropped } = outcome {
            self.notifier.warn(&format!(
                "Shutdown deadline of {:?} exceeded, {} queued records dropped",
                timeout, dropped
            ));
        }
        self.notifier.flush();
        outcome
    }

    fn join_worker(&self, handle: WorkerHandle, deadline: Instant) -> DrainOutcome {
        let wait = deadline.saturating_duration_since(Instant::now()) + CLOSE_GRACE;

        match handle.done.recv_timeout(wait) {
            Ok(exit) => {
                if handle.thread.join().is_err() {
                    eprintln!("[SHIPPER ERROR] Worker thread panicked during shutdown");
                }
                let dropped = self.queue.close();
                if exit.rejected {
                    DrainOutcome::LocalOnly { dropped }
                } else if dropped > 0 {
                    DrainOutcome::TimedOut { dropped }
                } else {
                    DrainOutcome::Clean
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                // The worker is stuck in I/O; closing the queue makes it stop
                // at its next check. The thread is detached.
                let dropped = self.queue.close();
                tracing::warn!("worker did not stop before the deadline, detaching it");
                DrainOutcome::TimedOut { dropped }
            }
            Err(RecvTimeoutError::Disconnected) => {
                if let Err(e) = handle.thread.join() {
                    eprintln!("[SHIPPER ERROR] Worker thread panicked: {:?}", e);
                }
                let dropped = self.queue.close();
                self.state.store(ConnectionState::Closed);
                DrainOutcome::TimedOut { dropped }
            }
        }
    }
}

impl Drop for Shipper {
    fn drop(&mut self) {
        if let DrainOutcome::TimedOut { dropped } = self.drain_and_close(DEFAULT_SHUTDOWN_TIMEOUT) {
            eprintln!(
                "[SHIPPER WARNING] Shipper dropped before its backlog was delivered, {} records lost",
                dropped
            );
        }
    }
}

impl fmt::Debug for Shipper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shipper")
            .field("handshake", &self.handshake)
            .field("state", &self.connection_state())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Builder for constructing a [`Shipper`] with a fluent API
///
/// # Example
/// ```
/// use rust_log_shipper::prelude::*;
/// use std::sync::Arc;
///
/// let shipper = Shipper::builder()
///     .config(ShipperConfig::builder().console_output(false).queue_size(100).build())
///     .appender(Arc::new(ConsoleAppender::with_colors(false)))
///     .on_drop(Arc::new(|count| {
///         eprintln!("ALERT: {} records dropped", count);
///     }))
///     .start()
///     .unwrap();
/// ```
pub struct ShipperBuilder {
    config: ShipperConfig,
    appenders: Vec<Arc<dyn Appender>>,
    transport: Option<Box<dyn Transport>>,
    on_drop: Option<DropCallback>,
}

impl ShipperBuilder {
    pub fn new() -> Self {
        Self {
            config: ShipperConfig::default(),
            appenders: Vec::new(),
            transport: None,
            on_drop: None,
        }
    }

    #[must_use = "builder methods return a new value"]
    pub fn config(mut self, config: ShipperConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a local appender.
    ///
    /// A console appender is added automatically when `console_output` is
    /// set in the configuration.
    #[must_use = "builder methods return a new value"]
    pub fn appender(mut self, appender: Arc<dyn Appender>) -> Self {
        self.appenders.push(appender);
        self
    }

    /// Use `transport` instead of a WebSocket connection to `server_url`
    #[must_use = "builder methods return a new value"]
    pub fn transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Callback for drop alerts (first drop, then every 1000th)
    #[must_use = "builder methods return a new value"]
    pub fn on_drop(mut self, callback: DropCallback) -> Self {
        self.on_drop = Some(callback);
        self
    }

    /// Build the shipper; see [`Shipper::start`]
    pub fn start(self) -> Result<Shipper> {
        let config = self.config;
        config.validate()?;

        let mut appenders: Vec<Arc<dyn Appender>> = Vec::new();
        if config.console_output {
            appenders.push(Arc::new(ConsoleAppender::from_config(&config)));
        }
        appenders.extend(self.appenders);
        let notifier = Arc::new(Notifier::new(appenders, self.on_drop));

        let stats = Arc::new(QueueStats::new());
        let queue = Arc::new(IntakeQueue::new(
            config.queue_size,
            config.backpressure_policy,
            Arc::clone(&stats),
        ));
        let state = Arc::new(AtomicConnectionState::default());
        let connection_metrics = Arc::new(ConnectionMetrics::new());
        let in_flight = Arc::new(AtomicU64::new(0));

        let mut shipper = Shipper {
            queue: Arc::clone(&queue),
            stats: Arc::clone(&stats),
            in_flight: Arc::clone(&in_flight),
            state: Arc::clone(&state),
            connection_metrics: Arc::clone(&connection_metrics),
            notifier: Arc::clone(&notifier),
            handshake: HandshakeOutcome::NoCredentials,
            min_level: config.level,
            shutdown: Mutex::new(Shutdown {
                worker: None,
                finished: false,
            }),
        };

        if !config.has_credentials() {
            tracing::info!("no collector credentials configured, running local-only");
            return Ok(shipper);
        }

        let transport: Box<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Box::new(WebSocketTransport::from_config(&config)?),
        };
        let connection = Connection::new(transport, &config, state, connection_metrics);
        let worker = Worker::new(queue, connection, &config, stats, in_flight, notifier);

        let (ready_tx, ready_rx) = bounded(1);
        let (done_tx, done_rx) = bounded(1);
        let thread = thread::Builder::new()
            .name("log-shipper".to_string())
            .spawn(move || worker.run(ready_tx, done_tx))?;
        shipper.shutdown.get_mut().worker = Some(WorkerHandle {
            thread,
            done: done_rx,
        });

        shipper.handshake = match ready_rx.recv_timeout(config.timeout + STARTUP_GRACE) {
            Ok(Ok(())) => HandshakeOutcome::Connected,
            Ok(Err(ShipperError::HandshakeRejected { reason })) => {
                HandshakeOutcome::Rejected { reason }
            }
            Ok(Err(e)) => HandshakeOutcome::Unreachable {
                reason: e.to_string(),
            },
            Err(_) => HandshakeOutcome::Unreachable {
                reason: format!("no handshake result within {:?}", config.timeout),
            },
        };

        match shipper.handshake {
            HandshakeOutcome::Rejected { ref reason } => shipper.notifier.warn(&format!(
                "Collector rejected credentials: {}. Shipping disabled, records stay local.",
                reason
            )),
            HandshakeOutcome::Unreachable { ref reason } => shipper.notifier.warn(&format!(
                "Could not connect to collector at {}: {}. \
                 Records are queued while reconnecting in the background.",
                config.server_url, reason
            )),
            _ => {}
        }

        Ok(shipper)
    }
}

impl Default for ShipperBuilder {
    fn default() -> Self {
        Self::new()
    }
}
