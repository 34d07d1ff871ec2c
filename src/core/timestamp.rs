//! Record capture time and timestamp formatting
//!
//! Every record carries two clocks: a monotonic `Instant` used for local
//! age and latency computations, and a UTC wall-clock time that is
//! serialized as ISO 8601 for the collector.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::{Duration, Instant};

/// Capture time of a log record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    monotonic: Instant,
    wall: DateTime<Utc>,
}

impl Timestamp {
    pub fn now() -> Self {
        Self {
            monotonic: Instant::now(),
            wall: Utc::now(),
        }
    }

    pub fn monotonic(&self) -> Instant {
        self.monotonic
    }

    pub fn wall(&self) -> DateTime<Utc> {
        self.wall
    }

    /// Time elapsed since capture, immune to wall-clock adjustments
    pub fn age(&self) -> Duration {
        self.monotonic.elapsed()
    }

    /// ISO 8601 / RFC 3339 with microseconds: `2025-01-08T10:30:45.123456Z`
    pub fn to_iso8601(&self) -> String {
        self.wall.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_iso8601())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    /// The monotonic half cannot travel; a decoded timestamp is anchored at
    /// decode time.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let wall = DateTime::parse_from_rfc3339(&raw)
            .map_err(serde::de::Error::custom)?
            .with_timezone(&Utc);
        Ok(Self {
            monotonic: Instant::now(),
            wall,
        })
    }
}

/// Timestamp styles for console rendering
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampFormat {
    /// `2025-01-08 10:30:45`
    #[default]
    Default,

    /// ISO 8601 with microseconds: `2025-01-08T10:30:45.123456Z`
    Iso8601Micros,

    /// Custom strftime format
    Custom(String),
}

impl TimestampFormat {
    pub const DEFAULT_PATTERN: &'static str = "%Y-%m-%d %H:%M:%S";

    #[must_use]
    pub fn format(&self, datetime: &DateTime<Utc>) -> String {
        match self {
            TimestampFormat::Default => datetime.format(Self::DEFAULT_PATTERN).to_string(),
            TimestampFormat::Iso8601Micros => {
                datetime.to_rfc3339_opts(SecondsFormat::Micros, true)
            }
            TimestampFormat::Custom(format_str) => datetime.format(format_str).to_string(),
        }
    }

    /// Interpret a configured date pattern
    pub fn from_pattern(pattern: &str) -> Self {
        if pattern == Self::DEFAULT_PATTERN {
            TimestampFormat::Default
        } else {
            TimestampFormat::Custom(pattern.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_iso8601_serialization() {
        let ts = Timestamp {
            monotonic: Instant::now(),
            wall: Utc.with_ymd_and_hms(2025, 1, 8, 10, 30, 45).unwrap(),
        };
        assert_eq!(ts.to_iso8601(), "2025-01-08T10:30:45.000000Z");
        assert_eq!(
            serde_json::to_string(&ts).unwrap(),
            "\"2025-01-08T10:30:45.000000Z\""
        );
    }

    #[test]
    fn test_deserialize_keeps_wall_clock() {
        let ts: Timestamp = serde_json::from_str("\"2025-01-08T10:30:45.250000Z\"").unwrap();
        assert_eq!(ts.wall().timestamp_millis() % 1000, 250);
    }

    #[test]
    fn test_console_formats() {
        let dt = Utc.with_ymd_and_hms(2025, 1, 8, 10, 30, 45).unwrap();
        assert_eq!(TimestampFormat::Default.format(&dt), "2025-01-08 10:30:45");
        assert_eq!(
            TimestampFormat::from_pattern("%d/%m/%Y").format(&dt),
            "08/01/2025"
        );
        assert_eq!(
            TimestampFormat::from_pattern("%Y-%m-%d %H:%M:%S"),
            TimestampFormat::Default
        );
    }

    #[test]
    fn test_age_is_monotonic() {
        let ts = Timestamp::now();
        std::thread::sleep(Duration::from_millis(5));
        assert!(ts.age() >= Duration::from_millis(5));
    }
}
