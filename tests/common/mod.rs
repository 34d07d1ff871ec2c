//! Shared fixtures: a scripted in-memory collector and a capturing appender

#![allow(dead_code)]

use parking_lot::Mutex;
use rust_log_shipper::prelude::*;
use rust_log_shipper::transport::{Frame, Reply, Transport};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How the scripted collector behaves; may be changed while a shipper runs
#[derive(Debug, Clone)]
pub struct Behavior {
    /// Refuse new connections and break the current link on the next send
    pub unreachable: bool,
    /// Hang in `connect` for the full timeout before refusing
    pub hang_on_connect: bool,
    pub reject_handshake: Option<String>,
    pub nack_batches: bool,
    /// Accept batches but never acknowledge them
    pub ignore_batches: bool,
    pub answer_pings: bool,
    pub ack_close: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            unreachable: false,
            hang_on_connect: false,
            reject_handshake: None,
            nack_batches: false,
            ignore_batches: false,
            answer_pings: true,
            ack_close: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct CollectorState {
    pub behavior: Behavior,
    /// Messages of acknowledged records, in arrival order
    pub delivered: Vec<String>,
    pub handshakes: usize,
    pub connects: usize,
    pub batches_acked: usize,
    pub batches_seen: usize,
    pub pings: usize,
    pub close_frames: usize,
    connected: bool,
    pending: VecDeque<Reply>,
}

/// Handle the test keeps to steer and inspect the collector
#[derive(Clone, Default)]
pub struct Collector(Arc<Mutex<CollectorState>>);

impl Collector {
    pub fn new(behavior: Behavior) -> Self {
        let collector = Collector::default();
        collector.0.lock().behavior = behavior;
        collector
    }

    pub fn transport(&self) -> Box<dyn Transport> {
        Box::new(ScriptedTransport {
            state: Arc::clone(&self.0),
        })
    }

    pub fn update(&self, f: impl FnOnce(&mut Behavior)) {
        f(&mut self.0.lock().behavior);
    }

    pub fn inspect<R>(&self, f: impl FnOnce(&CollectorState) -> R) -> R {
        f(&self.0.lock())
    }

    pub fn delivered(&self) -> Vec<String> {
        self.0.lock().delivered.clone()
    }
}

struct ScriptedTransport {
    state: Arc<Mutex<CollectorState>>,
}

impl Transport for ScriptedTransport {
    fn connect(&mut self, timeout: Duration) -> Result<()> {
        let (unreachable, hang) = {
            let mut state = self.state.lock();
            state.connects += 1;
            state.connected = false;
            state.pending.clear();
            (state.behavior.unreachable, state.behavior.hang_on_connect)
        };

        if hang {
            thread::sleep(timeout);
        }
        if unreachable || hang {
            return Err(ShipperError::transport("connect", "connection refused"));
        }

        self.state.lock().connected = true;
        Ok(())
    }

    fn send(&mut self, frame: &Frame<'_>) -> Result<()> {
        let mut state = self.state.lock();
        if state.behavior.unreachable {
            state.connected = false;
        }
        if !state.connected {
            return Err(ShipperError::transport("send", "broken pipe"));
        }

        match frame {
            Frame::Handshake { .. } => {
                state.handshakes += 1;
                let reply = match state.behavior.reject_handshake.clone() {
                    Some(reason) => Reply::Reject {
                        reason: Some(reason),
                    },
                    None => Reply::Ack { seq: None },
                };
                state.pending.push_back(reply);
            }
            Frame::Batch { seq, records } => {
                state.batches_seen += 1;
                if state.behavior.ignore_batches {
                    return Ok(());
                }
                if state.behavior.nack_batches {
                    state.pending.push_back(Reply::Nack {
                        seq: Some(*seq),
                        reason: Some("over quota".to_string()),
                    });
                } else {
                    state
                        .delivered
                        .extend(records.iter().map(|r| r.message.clone()));
                    state.batches_acked += 1;
                    state.pending.push_back(Reply::Ack { seq: Some(*seq) });
                }
            }
            Frame::Heartbeat => {
                state.pings += 1;
                if state.behavior.answer_pings {
                    state.pending.push_back(Reply::Pong);
                }
            }
            Frame::Close => {
                state.close_frames += 1;
                if state.behavior.ack_close {
                    state.pending.push_back(Reply::CloseAck);
                }
            }
        }
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Reply>> {
        if let Some(reply) = self.state.lock().pending.pop_front() {
            return Ok(Some(reply));
        }
        // Nothing to say: behave like a silent peer for the whole window
        thread::sleep(timeout);
        Ok(self.state.lock().pending.pop_front())
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.connected = false;
        state.pending.clear();
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Appender that keeps everything it is given
#[derive(Default)]
pub struct CapturingAppender {
    pub records: Mutex<Vec<LogRecord>>,
    pub warnings: Mutex<Vec<String>>,
}

impl CapturingAppender {
    pub fn messages(&self) -> Vec<String> {
        self.records.lock().iter().map(|r| r.message.clone()).collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }
}

impl Appender for CapturingAppender {
    fn append(&self, record: &LogRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn warn(&self, message: &str) -> Result<()> {
        self.warnings.lock().push(message.to_string());
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "capturing"
    }
}

/// Fast timings for tests, with credentials and console output off
pub fn test_config() -> rust_log_shipper::ShipperConfigBuilder {
    ShipperConfig::builder()
        .credentials("test-project", "test-secret")
        .console_output(false)
        .timeout(Duration::from_millis(200))
        .retry_delay(Duration::from_millis(20))
        .max_backoff(Duration::from_millis(100))
        .flush_interval(Duration::from_millis(20))
        .level(LogLevel::Debug)
}

/// Start a shipper wired to `collector` and a capturing appender
pub fn start_with(
    config: ShipperConfig,
    collector: &Collector,
) -> (Shipper, Arc<CapturingAppender>) {
    let appender = Arc::new(CapturingAppender::default());
    let shipper = Shipper::builder()
        .config(config)
        .appender(appender.clone())
        .transport(collector.transport())
        .start()
        .expect("valid configuration");
    (shipper, appender)
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub fn record(message: impl Into<String>) -> LogRecord {
    LogRecord::new(LogLevel::Info, message)
}
