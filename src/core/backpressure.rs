//! Backpressure policies for the intake queue
//!
//! When the intake queue is full, the policy decides which record loses:
//! the oldest unsent one, the incoming one, or nobody (the caller is told
//! and keeps the decision).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Policy for handling a full intake queue
///
/// # Example
///
/// ```
/// use rust_log_shipper::BackpressurePolicy;
///
/// let policy: BackpressurePolicy = "drop_newest".parse().unwrap();
/// assert_eq!(policy, BackpressurePolicy::DropNewest);
/// assert_eq!(BackpressurePolicy::default(), BackpressurePolicy::DropOldest);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Evict the oldest unsent record and accept the new one
    #[default]
    DropOldest,

    /// Refuse the incoming record; it is counted as dropped
    DropNewest,

    /// Refuse the incoming record and report it to the caller
    ///
    /// The refusal is still counted as a drop; whether to retry is the
    /// caller's call.
    Reject,
}

impl fmt::Display for BackpressurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackpressurePolicy::DropOldest => write!(f, "drop_oldest"),
            BackpressurePolicy::DropNewest => write!(f, "drop_newest"),
            BackpressurePolicy::Reject => write!(f, "reject"),
        }
    }
}

impl FromStr for BackpressurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "drop_oldest" => Ok(BackpressurePolicy::DropOldest),
            "drop_newest" => Ok(BackpressurePolicy::DropNewest),
            "reject" => Ok(BackpressurePolicy::Reject),
            _ => Err(format!("Invalid backpressure policy: '{}'", s)),
        }
    }
}

/// What happened to a record handed to the intake queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnqueueOutcome {
    /// Queued with room to spare
    Accepted,
    /// Queued after evicting the oldest unsent record
    DroppedOldest,
    /// Not queued; the incoming record was discarded
    DroppedNewest,
    /// Not queued; the caller decides what to do with it
    Rejected,
}

impl EnqueueOutcome {
    /// Whether the submitted record itself is now queued
    pub fn is_queued(&self) -> bool {
        matches!(self, EnqueueOutcome::Accepted | EnqueueOutcome::DroppedOldest)
    }

    /// Whether the call cost a record (incoming or evicted)
    pub fn dropped_a_record(&self) -> bool {
        !matches!(self, EnqueueOutcome::Accepted)
    }
}

impl fmt::Display for EnqueueOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnqueueOutcome::Accepted => write!(f, "Accepted"),
            EnqueueOutcome::DroppedOldest => write!(f, "DroppedOldest"),
            EnqueueOutcome::DroppedNewest => write!(f, "DroppedNewest"),
            EnqueueOutcome::Rejected => write!(f, "Rejected"),
        }
    }
}

/// Callback type for drop notifications
///
/// Called when records are dropped; the parameter is the total count of
/// dropped records so far.
pub type DropCallback = Arc<dyn Fn(u64) + Send + Sync>;
