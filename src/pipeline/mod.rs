//! Delivery pipeline: intake queue, worker, connection state machine and
//! the shipper facade

pub mod backoff;
pub mod connection;
pub mod queue;
pub mod shipper;
pub mod state;
pub mod worker;

mod notifier;

pub use backoff::Backoff;
pub use connection::Connection;
pub use notifier::DROP_ALERT_INTERVAL;
pub use queue::{Admission, IntakeQueue, Lifecycle};
pub use shipper::{
    DrainOutcome, HandshakeOutcome, Shipper, ShipperBuilder, DEFAULT_SHUTDOWN_TIMEOUT, SEPARATOR,
};
pub use state::{AtomicConnectionState, ConnectionState};
pub use worker::RetryContext;
