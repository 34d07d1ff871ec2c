//! JSON wire frames exchanged with the collector

use crate::core::{LogRecord, Result};
use serde::{Deserialize, Serialize};

/// Client to collector frame.
///
/// Frames borrow the records they carry; a batch is serialized straight
/// from the worker's buffer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame<'a> {
    /// First frame after the transport opens
    Handshake {
        project_id: &'a str,
        project_secret: &'a str,
        metadata: &'a LogRecord,
    },
    Batch {
        seq: u64,
        records: &'a [LogRecord],
    },
    /// Liveness check; transports with native ping frames use those instead
    Heartbeat,
    /// Intentional shutdown
    Close,
}

impl Frame<'_> {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Handshake { .. } => "handshake",
            Frame::Batch { .. } => "batch",
            Frame::Heartbeat => "heartbeat",
            Frame::Close => "close",
        }
    }
}

/// Collector to client frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    /// Handshake accepted (no `seq`) or batch delivered
    Ack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },
    /// Batch refused
    Nack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Handshake refused; credentials are not accepted
    Reject {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Pong,
    CloseAck,
}

impl Reply {
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Whether this reply answers batch `seq`; replies without a sequence
    /// number answer whatever is outstanding
    pub fn answers(&self, seq: u64) -> bool {
        match self {
            Reply::Ack { seq: Some(s) } | Reply::Nack { seq: Some(s), .. } => *s == seq,
            Reply::Ack { seq: None } | Reply::Nack { seq: None, .. } => true,
            _ => false,
        }
    }
}
