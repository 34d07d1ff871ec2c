//! Connection state machine for the collector link
//!
//! ```text
//! Disconnected ──handshake──▶ Handshaking ──ack──▶ Connected
//!      ▲                          │                 │  send error
//!      └──────── fail/timeout ────┘                 │  missed pong
//!                                                    ▼
//!                         Handshaking ◀─backoff── Reconnecting
//!
//! any state ──close──▶ Closing ──▶ Closed
//! ```
//!
//! The connection is owned by the worker; the current state is published
//! through an [`AtomicConnectionState`] so the shipper can report it. Every
//! round trip is bounded by `timeout`, and while draining, by the drain
//! deadline as well.

use super::backoff::Backoff;
use super::state::{AtomicConnectionState, ConnectionState};
use crate::core::{
    ConnectionMetrics, LogLevel, LogRecord, Payload, Result, ShipperConfig, ShipperError,
};
use crate::transport::{Frame, Reply, Transport};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct Connection {
    transport: Box<dyn Transport>,
    state: Arc<AtomicConnectionState>,
    metrics: Arc<ConnectionMetrics>,
    backoff: Backoff,
    timeout: Duration,
    heartbeat_interval: Duration,
    project_id: String,
    project_secret: String,
    /// Sent with every handshake
    metadata: LogRecord,
    /// Consecutive failed handshakes or lost links
    failures: u32,
    next_attempt: Instant,
    next_heartbeat: Instant,
    next_seq: u64,
    /// Collector refused our credentials; never retried
    rejection: Option<String>,
    ever_connected: bool,
    /// Hard stop for every wait, set while draining
    deadline: Option<Instant>,
}

impl Connection {
    pub fn new(
        transport: Box<dyn Transport>,
        config: &ShipperConfig,
        state: Arc<AtomicConnectionState>,
        metrics: Arc<ConnectionMetrics>,
    ) -> Self {
        let metadata = config
            .metadata
            .clone()
            .unwrap_or_else(Payload::environment);
        let now = Instant::now();

        Self {
            transport,
            state,
            metrics,
            backoff: Backoff::from_config(config),
            timeout: config.timeout,
            heartbeat_interval: config.heartbeat_interval,
            project_id: config.project_id.clone().unwrap_or_default(),
            project_secret: config.project_secret.clone().unwrap_or_default(),
            metadata: LogRecord::new(LogLevel::Info, "metadata").with_payload(metadata),
            failures: 0,
            next_attempt: now,
            next_heartbeat: now + config.heartbeat_interval,
            next_seq: 0,
            rejection: None,
            ever_connected: false,
            deadline: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.load()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Reason the collector gave for refusing our credentials
    pub fn rejection(&self) -> Option<&str> {
        self.rejection.as_deref()
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Earliest time for the next handshake attempt
    pub fn next_attempt(&self) -> Instant {
        self.next_attempt
    }

    pub fn next_heartbeat(&self) -> Instant {
        self.next_heartbeat
    }

    /// Whether a handshake may be attempted now
    pub fn connect_due(&self, now: Instant) -> bool {
        !self.is_connected()
            && !self.state().is_terminal()
            && self.rejection.is_none()
            && now >= self.next_attempt
    }

    pub fn heartbeat_due(&self, now: Instant) -> bool {
        self.is_connected() && now >= self.next_heartbeat
    }

    /// Clip every subsequent wait to `deadline`
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    fn horizon(&self) -> Instant {
        let limit = Instant::now() + self.timeout;
        self.deadline.map_or(limit, |deadline| deadline.min(limit))
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.load();
        if previous != state {
            tracing::debug!(from = %previous, to = %state, transport = self.transport.name(), "connection state change");
            if previous == ConnectionState::Connected {
                self.metrics.record_link_down();
            }
            self.metrics.record_state_change();
            self.state.store(state);
        }
    }

    /// Open the transport, present credentials and metadata, and wait for
    /// the collector's acknowledgment.
    ///
    /// On failure the next attempt is scheduled after a backoff delay; a
    /// rejection of the credentials disables further attempts.
    pub fn handshake(&mut self) -> Result<()> {
        let started = Instant::now();
        self.set_state(ConnectionState::Handshaking);
        self.metrics.record_connect_attempt();

        let until = self.horizon();
        match self.exchange_handshake(until) {
            Ok(()) => {
                self.failures = 0;
                self.ever_connected = true;
                self.next_heartbeat = Instant::now() + self.heartbeat_interval;
                self.metrics.record_handshake(started.elapsed());
                self.set_state(ConnectionState::Connected);
                tracing::info!(transport = self.transport.name(), "connected to collector");
                Ok(())
            }
            Err(e) => {
                self.transport.close();
                if let ShipperError::HandshakeRejected { ref reason } = e {
                    tracing::warn!(reason = %reason, "collector rejected credentials");
                    self.rejection = Some(reason.clone());
                    self.set_state(ConnectionState::Disconnected);
                } else {
                    self.schedule_retry();
                    tracing::debug!(
                        error = %e,
                        attempt = self.failures,
                        delay_ms = self.next_attempt.saturating_duration_since(Instant::now()).as_millis() as u64,
                        "handshake failed"
                    );
                    self.set_state(if self.ever_connected {
                        ConnectionState::Reconnecting
                    } else {
                        ConnectionState::Disconnected
                    });
                }
                Err(e)
            }
        }
    }

    fn exchange_handshake(&mut self, until: Instant) -> Result<()> {
        let remaining = until.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(self.handshake_timeout());
        }

        self.transport.connect(remaining)?;
        self.transport.send(&Frame::Handshake {
            project_id: &self.project_id,
            project_secret: &self.project_secret,
            metadata: &self.metadata,
        })?;

        loop {
            let remaining = until.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.transport.recv(remaining)? {
                Some(Reply::Ack { .. }) => return Ok(()),
                Some(Reply::Reject { reason }) => {
                    return Err(ShipperError::handshake_rejected(
                        reason.unwrap_or_else(|| "credentials rejected".to_string()),
                    ));
                }
                Some(other) => tracing::debug!(?other, "ignoring reply while handshaking"),
                None => break,
            }
        }

        Err(self.handshake_timeout())
    }

    fn handshake_timeout(&self) -> ShipperError {
        ShipperError::HandshakeTimeout {
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }

    /// Transmit one batch and wait for its acknowledgment.
    ///
    /// A negative acknowledgment leaves the link up; any transport failure,
    /// including a missing acknowledgment, tears it down.
    pub fn send_batch(&mut self, records: &[LogRecord]) -> Result<()> {
        if !self.is_connected() {
            return Err(ShipperError::transport("send", "not connected"));
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let result = self.exchange_batch(seq, records);
        match result {
            Ok(()) => self.metrics.record_batch_sent(),
            Err(ShipperError::BatchRejected { .. }) => self.metrics.record_batch_rejected(),
            Err(ref e) => self.lose_link(e),
        }
        result
    }

    fn exchange_batch(&mut self, seq: u64, records: &[LogRecord]) -> Result<()> {
        self.transport.send(&Frame::Batch { seq, records })?;

        let until = self.horizon();
        loop {
            let remaining = until.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.transport.recv(remaining)? {
                Some(reply) if reply.answers(seq) => {
                    return match reply {
                        Reply::Nack { reason, .. } => Err(ShipperError::batch_rejected(
                            seq,
                            reason.unwrap_or_else(|| "no reason given".to_string()),
                        )),
                        _ => Ok(()),
                    };
                }
                Some(other) => tracing::debug!(?other, seq, "ignoring unrelated reply"),
                None => break,
            }
        }

        Err(ShipperError::transport(
            "awaiting ack",
            format!("no acknowledgment for batch {} within {:?}", seq, self.timeout),
        ))
    }

    /// Check the link; a missing pong tears it down
    pub fn heartbeat(&mut self) -> Result<()> {
        self.metrics.record_heartbeat();

        match self.exchange_heartbeat() {
            Ok(()) => {
                self.next_heartbeat = Instant::now() + self.heartbeat_interval;
                Ok(())
            }
            Err(e) => {
                self.metrics.record_heartbeat_missed();
                self.lose_link(&e);
                Err(e)
            }
        }
    }

    fn exchange_heartbeat(&mut self) -> Result<()> {
        self.transport.send(&Frame::Heartbeat)?;

        let until = self.horizon();
        loop {
            let remaining = until.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.transport.recv(remaining)? {
                Some(Reply::Pong) => return Ok(()),
                Some(other) => tracing::debug!(?other, "ignoring reply while awaiting pong"),
                None => break,
            }
        }

        Err(ShipperError::transport(
            "heartbeat",
            format!("no pong within {:?}", self.timeout),
        ))
    }

    fn lose_link(&mut self, cause: &ShipperError) {
        self.transport.close();
        self.metrics.record_transport_error();
        self.metrics.record_reconnect();
        self.schedule_retry();
        self.set_state(ConnectionState::Reconnecting);
        tracing::warn!(
            error = %cause,
            attempt = self.failures,
            delay_ms = self.next_attempt.saturating_duration_since(Instant::now()).as_millis() as u64,
            "collector link lost, reconnecting"
        );
    }

    fn schedule_retry(&mut self) {
        self.failures = self.failures.saturating_add(1);
        self.next_attempt = Instant::now() + self.backoff.delay(self.failures);
    }

    /// Announce shutdown and release the transport.
    ///
    /// Waits for the collector's close acknowledgment until `deadline`;
    /// returns whether it arrived.
    pub fn close(&mut self, deadline: Instant) -> bool {
        if self.state().is_terminal() {
            return false;
        }

        let was_connected = self.is_connected();
        self.set_state(ConnectionState::Closing);

        let acknowledged = was_connected
            && match self.exchange_close(deadline) {
                Ok(acked) => acked,
                Err(e) => {
                    tracing::debug!(error = %e, "close frame not delivered");
                    false
                }
            };

        self.transport.close();
        self.set_state(ConnectionState::Closed);
        acknowledged
    }

    fn exchange_close(&mut self, deadline: Instant) -> Result<bool> {
        self.transport.send(&Frame::Close)?;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            match self.transport.recv(remaining)? {
                Some(Reply::CloseAck) => return Ok(true),
                Some(_) => continue,
                None => return Ok(false),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Transport that replays canned results and records frame kinds
    #[derive(Default)]
    struct Scripted {
        connects: VecDeque<Result<()>>,
        replies: VecDeque<Result<Option<Reply>>>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl Scripted {
        fn reply(mut self, reply: Reply) -> Self {
            self.replies.push_back(Ok(Some(reply)));
            self
        }

        fn silence(mut self) -> Self {
            self.replies.push_back(Ok(None));
            self
        }

        fn refuse_connect(mut self) -> Self {
            self.connects
                .push_back(Err(ShipperError::transport("connect", "refused")));
            self
        }
    }

    impl Transport for Scripted {
        fn connect(&mut self, _timeout: Duration) -> Result<()> {
            self.connects.pop_front().unwrap_or(Ok(()))
        }

        fn send(&mut self, frame: &Frame<'_>) -> Result<()> {
            self.sent.lock().push(frame.kind().to_string());
            Ok(())
        }

        fn recv(&mut self, _timeout: Duration) -> Result<Option<Reply>> {
            self.replies.pop_front().unwrap_or(Ok(None))
        }

        fn close(&mut self) {}

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn connection(transport: Scripted) -> (Connection, Arc<ConnectionMetrics>) {
        let config = ShipperConfig::builder()
            .credentials("proj", "secret")
            .retry_delay(Duration::from_millis(100))
            .timeout(Duration::from_millis(50))
            .build();
        let metrics = Arc::new(ConnectionMetrics::new());
        let connection = Connection::new(
            Box::new(transport),
            &config,
            Arc::new(AtomicConnectionState::default()),
            Arc::clone(&metrics),
        );
        (connection, metrics)
    }

    fn ack() -> Reply {
        Reply::Ack { seq: None }
    }

    #[test]
    fn test_handshake_ack_connects() {
        let transport = Scripted::default().reply(ack());
        let sent = Arc::clone(&transport.sent);
        let (mut conn, metrics) = connection(transport);

        assert!(conn.connect_due(Instant::now()));
        conn.handshake().unwrap();

        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(*sent.lock(), ["handshake"]);
        assert_eq!(metrics.snapshot().handshakes, 1);
        assert!(!conn.connect_due(Instant::now()));
    }

    #[test]
    fn test_handshake_reject_disables_retries() {
        let (mut conn, _) = connection(Scripted::default().reply(Reply::Reject {
            reason: Some("bad secret".to_string()),
        }));

        let err = conn.handshake().unwrap_err();
        assert!(err.is_handshake_rejection());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.rejection(), Some("bad secret"));
        assert!(!conn.connect_due(Instant::now() + Duration::from_secs(3600)));
    }

    #[test]
    fn test_handshake_timeout_schedules_backoff() {
        let (mut conn, _) = connection(Scripted::default().silence());

        let before = Instant::now();
        let err = conn.handshake().unwrap_err();
        assert!(matches!(err, ShipperError::HandshakeTimeout { .. }));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.failures(), 1);
        // 100ms base with 20% jitter
        assert!(conn.next_attempt() >= before + Duration::from_millis(80));
        assert!(!conn.connect_due(Instant::now()));
    }

    #[test]
    fn test_refused_connect_is_transport_failure() {
        let (mut conn, metrics) = connection(Scripted::default().refuse_connect());
        assert!(conn.handshake().unwrap_err().is_transport());
        assert_eq!(metrics.snapshot().connect_attempts, 1);
        assert_eq!(metrics.snapshot().handshakes, 0);
    }

    #[test]
    fn test_nack_keeps_link_up() {
        let transport = Scripted::default().reply(ack()).reply(Reply::Nack {
            seq: Some(0),
            reason: Some("quota".to_string()),
        });
        let (mut conn, metrics) = connection(transport);
        conn.handshake().unwrap();

        let records = vec![LogRecord::new(LogLevel::Info, "a")];
        let err = conn.send_batch(&records).unwrap_err();
        assert!(matches!(err, ShipperError::BatchRejected { seq: 0, .. }));
        assert_eq!(conn.state(), ConnectionState::Connected);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches_rejected, 1);
        assert_eq!(snapshot.transport_errors, 0);
        assert_eq!(snapshot.batches_sent, 0);
    }

    #[test]
    fn test_missing_ack_reconnects() {
        let (mut conn, metrics) = connection(Scripted::default().reply(ack()).silence());
        conn.handshake().unwrap();

        let records = vec![LogRecord::new(LogLevel::Info, "a")];
        assert!(conn.send_batch(&records).unwrap_err().is_transport());
        assert_eq!(conn.state(), ConnectionState::Reconnecting);
        assert_eq!(metrics.snapshot().reconnects, 1);
        assert_eq!(metrics.snapshot().transport_errors, 1);
    }

    #[test]
    fn test_link_metrics_follow_state() {
        let (mut conn, metrics) = connection(Scripted::default().reply(ack()).silence());
        conn.handshake().unwrap();

        std::thread::sleep(Duration::from_millis(20));
        let up = metrics.snapshot();
        // Disconnected -> Handshaking -> Connected
        assert_eq!(up.state_changes, 2);
        assert!(up.last_handshake_ms <= 50);
        assert!(up.uptime_ms >= 15, "uptime was {}ms", up.uptime_ms);

        // Missing ack: Connected -> Reconnecting closes the uptime window
        let records = vec![LogRecord::new(LogLevel::Info, "a")];
        assert!(conn.send_batch(&records).is_err());
        let down = metrics.snapshot();
        assert_eq!(down.state_changes, 3);
        assert_eq!(down.uptime_ms, 0);
        assert!(down.connected_ms >= up.uptime_ms);
    }

    #[test]
    fn test_batch_ack_matches_sequence() {
        let transport = Scripted::default()
            .reply(ack())
            .reply(Reply::Ack { seq: Some(0) })
            .reply(Reply::Ack { seq: Some(7) })
            .reply(Reply::Pong)
            .reply(Reply::Ack { seq: Some(1) });
        let (mut conn, metrics) = connection(transport);
        conn.handshake().unwrap();

        let records = vec![LogRecord::new(LogLevel::Info, "a")];
        conn.send_batch(&records).unwrap();
        conn.send_batch(&records).unwrap();
        assert_eq!(metrics.snapshot().batches_sent, 2);
    }

    #[test]
    fn test_heartbeat_pong_and_miss() {
        let transport = Scripted::default().reply(ack()).reply(Reply::Pong).silence();
        let (mut conn, metrics) = connection(transport);
        conn.handshake().unwrap();

        conn.heartbeat().unwrap();
        assert_eq!(conn.state(), ConnectionState::Connected);

        assert!(conn.heartbeat().is_err());
        assert_eq!(conn.state(), ConnectionState::Reconnecting);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.heartbeats_sent, 2);
        assert_eq!(snapshot.heartbeats_missed, 1);
    }

    #[test]
    fn test_close_waits_for_ack() {
        let transport = Scripted::default().reply(ack()).reply(Reply::CloseAck);
        let sent = Arc::clone(&transport.sent);
        let (mut conn, _) = connection(transport);
        conn.handshake().unwrap();

        assert!(conn.close(Instant::now() + Duration::from_millis(100)));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(*sent.lock(), ["handshake", "close"]);

        // Terminal: no further transitions
        assert!(!conn.close(Instant::now() + Duration::from_millis(100)));
        assert!(!conn.connect_due(Instant::now() + Duration::from_secs(3600)));
    }

    #[test]
    fn test_close_without_link_skips_close_frame() {
        let transport = Scripted::default();
        let sent = Arc::clone(&transport.sent);
        let (mut conn, _) = connection(transport);

        assert!(!conn.close(Instant::now()));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(sent.lock().is_empty());
    }
}
