//! Transports carry frames between the worker and the collector
//!
//! The worker is the only caller, so implementations take `&mut self` and
//! need no internal locking. Every blocking call is bounded by an explicit
//! timeout.

pub mod frame;
pub mod websocket;

pub use frame::{Frame, Reply};
pub use websocket::WebSocketTransport;

use crate::core::Result;
use std::time::Duration;

pub trait Transport: Send {
    /// Open the link; any previous link is torn down first
    fn connect(&mut self, timeout: Duration) -> Result<()>;

    fn send(&mut self, frame: &Frame<'_>) -> Result<()>;

    /// Next reply from the collector, or `None` if nothing arrived within
    /// `timeout`
    fn recv(&mut self, timeout: Duration) -> Result<Option<Reply>>;

    /// Release the link; never fails
    fn close(&mut self);

    fn name(&self) -> &str;
}
