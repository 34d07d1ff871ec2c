//! Log level definitions

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Severity of a log record.
///
/// The five severities are totally ordered. `Success` and `Failure` are
/// outcome markers: they carry a numeric code for the wire but do not
/// compare with the severities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
    Success,
    Failure,
}

impl LogLevel {
    pub const ALL: [LogLevel; 7] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Critical,
        LogLevel::Success,
        LogLevel::Failure,
    ];

    pub fn to_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
            LogLevel::Success => "SUCCESS",
            LogLevel::Failure => "FAILURE",
        }
    }

    /// Numeric code used on the wire
    pub const fn code(&self) -> u8 {
        match self {
            LogLevel::Debug => 10,
            LogLevel::Info => 20,
            LogLevel::Success => 25,
            LogLevel::Warning => 30,
            LogLevel::Error => 40,
            LogLevel::Failure => 45,
            LogLevel::Critical => 50,
        }
    }

    /// Position in [`LogLevel::ALL`]
    pub const fn index(&self) -> usize {
        match self {
            LogLevel::Debug => 0,
            LogLevel::Info => 1,
            LogLevel::Warning => 2,
            LogLevel::Error => 3,
            LogLevel::Critical => 4,
            LogLevel::Success => 5,
            LogLevel::Failure => 6,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.code() == code)
    }

    /// Rank among the ordered severities, `None` for outcome markers
    pub const fn severity(&self) -> Option<u8> {
        match self {
            LogLevel::Debug => Some(0),
            LogLevel::Info => Some(1),
            LogLevel::Warning => Some(2),
            LogLevel::Error => Some(3),
            LogLevel::Critical => Some(4),
            LogLevel::Success | LogLevel::Failure => None,
        }
    }

    pub const fn is_marker(&self) -> bool {
        self.severity().is_none()
    }

    /// Whether a record at this level passes a `min` threshold.
    ///
    /// Markers always pass.
    pub fn passes(&self, min: LogLevel) -> bool {
        match (self.severity(), min.severity()) {
            (Some(level), Some(min)) => level >= min,
            _ => true,
        }
    }

    #[cfg(feature = "console")]
    pub fn color_code(&self) -> colored::Color {
        use colored::Color::*;
        match self {
            LogLevel::Debug => Cyan,
            LogLevel::Info => White,
            LogLevel::Warning => Yellow,
            LogLevel::Error => Red,
            LogLevel::Critical => BrightRed,
            LogLevel::Success => Green,
            LogLevel::Failure => BrightRed,
        }
    }
}

impl PartialOrd for LogLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        match (self.severity(), other.severity()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" | "FATAL" => Ok(LogLevel::Critical),
            "SUCCESS" => Ok(LogLevel::Success),
            "FAILURE" => Ok(LogLevel::Failure),
            _ => Err(format!("Invalid log level: '{}'", s)),
        }
    }
}

impl Serialize for LogLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Code(u8),
            Name(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Code(code) => LogLevel::from_code(code)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown level code {}", code))),
            Repr::Name(name) => name.parse().map_err(serde::de::Error::custom),
        }
    }
}
