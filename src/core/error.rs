//! Error types for the log shipper

pub type Result<T> = std::result::Result<T, ShipperError>;

#[derive(Debug, thiserror::Error)]
pub enum ShipperError {
    /// Generic IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Connect, send or read failure on the collector link
    #[error("Transport error while {operation}: {message}")]
    Transport { operation: String, message: String },

    /// Collector refused the project credentials
    #[error("Handshake rejected by collector: {reason}")]
    HandshakeRejected { reason: String },

    /// Collector did not acknowledge the handshake in time
    #[error("Handshake not acknowledged within {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },

    /// Collector answered a batch with a negative acknowledgment
    #[error("Batch {seq} rejected by collector: {reason}")]
    BatchRejected { seq: u64, reason: String },

    /// Invalid configuration with details
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// Shipper already closed
    #[error("Shipper already closed")]
    Closed,

    /// Console collaborator error
    #[error("Appender '{name}' failed: {message}")]
    AppenderError { name: String, message: String },

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl ShipperError {
    /// Create a transport error with operation context
    pub fn transport(operation: impl Into<String>, message: impl ToString) -> Self {
        ShipperError::Transport {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Create a handshake rejection
    pub fn handshake_rejected(reason: impl Into<String>) -> Self {
        ShipperError::HandshakeRejected {
            reason: reason.into(),
        }
    }

    /// Create a batch rejection
    pub fn batch_rejected(seq: u64, reason: impl Into<String>) -> Self {
        ShipperError::BatchRejected {
            seq,
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        ShipperError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create an appender error
    pub fn appender(name: impl Into<String>, message: impl Into<String>) -> Self {
        ShipperError::AppenderError {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        ShipperError::Other(msg.into())
    }

    /// Whether the failure is recoverable by tearing down the link and reconnecting
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ShipperError::Transport { .. }
                | ShipperError::IoError(_)
                | ShipperError::HandshakeTimeout { .. }
        )
    }

    /// Whether the collector refused our identity; such failures are never retried
    pub fn is_handshake_rejection(&self) -> bool {
        matches!(self, ShipperError::HandshakeRejected { .. })
    }
}
