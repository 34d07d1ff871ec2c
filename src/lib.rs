//! # Rust Log Shipper
//!
//! An in-process log shipping pipeline: application threads emit structured
//! records, a background worker delivers them in batches to a remote
//! collector over a persistent WebSocket connection.
//!
//! ## Features
//!
//! - **Never blocks the caller**: `enqueue` is bounded by a mutex, never by I/O
//! - **Backpressure policies**: drop oldest, drop newest, or reject when full
//! - **Resilient link**: handshake, heartbeat, reconnection with jittered backoff
//! - **Bounded shutdown**: `drain_and_close` always returns by its deadline
//! - **Local-only mode**: without credentials, records are only rendered locally
//!
//! ## Example
//!
//! ```no_run
//! use rust_log_shipper::prelude::*;
//! use std::time::Duration;
//!
//! let config = ShipperConfig::builder()
//!     .credentials("my-project", "s3cret")
//!     .server_url("wss://collector.example.com/v1/logs")
//!     .build();
//!
//! let shipper = Shipper::start(config)?;
//! shipper.info("service started");
//! shipper.log_with_payload(
//!     LogLevel::Error,
//!     "payment failed",
//!     Payload::new().with_field("order_id", 1234),
//! );
//!
//! let outcome = shipper.drain_and_close(Duration::from_secs(5));
//! assert!(outcome.is_clean());
//! # Ok::<(), ShipperError>(())
//! ```

pub mod appenders;
pub mod core;
pub mod pipeline;
pub mod transport;
pub mod macros;

pub mod prelude {
    pub use crate::appenders::ConsoleAppender;
    pub use crate::core::{
        Appender, BackpressurePolicy, DropCallback, EnqueueOutcome, LogLevel, LogRecord, Payload,
        Result, ShipperConfig, ShipperError, StatsSnapshot, TimestampFormat,
    };
    pub use crate::pipeline::{
        ConnectionState, DrainOutcome, HandshakeOutcome, Shipper, ShipperBuilder,
        DEFAULT_SHUTDOWN_TIMEOUT,
    };
}

pub use appenders::ConsoleAppender;
pub use core::{
    Appender, BackpressurePolicy, ConnectionMetrics, ConnectionSnapshot, DropCallback,
    EnqueueOutcome, LogLevel, LogRecord, Payload, QueueStats, Result, ShipperConfig,
    ShipperConfigBuilder, ShipperError, StatsSnapshot, Timestamp, TimestampFormat,
};
pub use pipeline::{
    Backoff, ConnectionState, DrainOutcome, HandshakeOutcome, Shipper, ShipperBuilder,
    DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use transport::{Frame, Reply, Transport, WebSocketTransport};
