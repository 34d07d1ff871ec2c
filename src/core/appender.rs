//! Appender trait for the local console collaborator

use super::{error::Result, log_record::LogRecord};

/// Local, synchronous output for records and pipeline warnings.
///
/// Called from producer threads and from the worker, so implementations
/// take `&self` and do their own locking. Failures never affect delivery:
/// the shipper swallows them and reports on stderr.
pub trait Appender: Send + Sync {
    fn append(&self, record: &LogRecord) -> Result<()>;

    /// Pipeline warning (drops, handshake failures, shutdown timeouts)
    fn warn(&self, message: &str) -> Result<()>;

    fn flush(&self) -> Result<()>;

    fn name(&self) -> &str;
}
