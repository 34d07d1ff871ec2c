//! Core shipper types and traits

pub mod appender;
pub mod backpressure;
pub mod config;
pub mod error;
pub mod log_level;
pub mod log_record;
pub mod metrics;
pub mod payload;
pub mod timestamp;

pub use appender::Appender;
pub use backpressure::{BackpressurePolicy, DropCallback, EnqueueOutcome};
pub use config::{ShipperConfig, ShipperConfigBuilder};
pub use error::{Result, ShipperError};
pub use log_level::LogLevel;
pub use log_record::LogRecord;
pub use metrics::{ConnectionMetrics, ConnectionSnapshot, QueueStats, StatsSnapshot};
pub use payload::Payload;
pub use timestamp::{Timestamp, TimestampFormat};
