//! Producer macros with `format!`-style arguments.
//!
//! Each macro takes a shipper (anything with the `Shipper` producer
//! methods) followed by format arguments.
//!
//! # Examples
//!
//! ```
//! use rust_log_shipper::prelude::*;
//! use rust_log_shipper::{info, success};
//!
//! let shipper = Shipper::start(ShipperConfig::builder().console_output(false).build()).unwrap();
//!
//! info!(shipper, "Server started");
//!
//! let port = 8080;
//! info!(shipper, "Server listening on port {}", port);
//! success!(shipper, "Migration {} applied", "0042");
//! ```

/// Ship a message at an explicit level.
///
/// # Examples
///
/// ```
/// # use rust_log_shipper::prelude::*;
/// # let shipper = Shipper::start(ShipperConfig::builder().console_output(false).build()).unwrap();
/// use rust_log_shipper::log;
/// log!(shipper, LogLevel::Info, "Simple message");
/// log!(shipper, LogLevel::Error, "Error code: {}", 500);
/// ```
#[macro_export]
macro_rules! log {
    ($shipper:expr, $level:expr, $($arg:tt)+) => {
        $shipper.log($level, format!($($arg)+))
    };
}

/// Ship a debug-level message.
#[macro_export]
macro_rules! debug {
    ($shipper:expr, $($arg:tt)+) => {
        $crate::log!($shipper, $crate::LogLevel::Debug, $($arg)+)
    };
}

/// Ship an info-level message.
#[macro_export]
macro_rules! info {
    ($shipper:expr, $($arg:tt)+) => {
        $crate::log!($shipper, $crate::LogLevel::Info, $($arg)+)
    };
}

/// Ship a warning-level message.
///
/// # Examples
///
/// ```
/// # use rust_log_shipper::prelude::*;
/// # let shipper = Shipper::start(ShipperConfig::builder().console_output(false).build()).unwrap();
/// use rust_log_shipper::warning;
/// warning!(shipper, "Retry {} of {}", 1, 3);
/// ```
#[macro_export]
macro_rules! warning {
    ($shipper:expr, $($arg:tt)+) => {
        $crate::log!($shipper, $crate::LogLevel::Warning, $($arg)+)
    };
}

/// Ship an error-level message.
#[macro_export]
macro_rules! error {
    ($shipper:expr, $($arg:tt)+) => {
        $crate::log!($shipper, $crate::LogLevel::Error, $($arg)+)
    };
}

/// Ship a critical-level message.
#[macro_export]
macro_rules! critical {
    ($shipper:expr, $($arg:tt)+) => {
        $crate::log!($shipper, $crate::LogLevel::Critical, $($arg)+)
    };
}

/// Ship a SUCCESS marker.
#[macro_export]
macro_rules! success {
    ($shipper:expr, $($arg:tt)+) => {
        $crate::log!($shipper, $crate::LogLevel::Success, $($arg)+)
    };
}

/// Ship a FAILURE marker.
#[macro_export]
macro_rules! failure {
    ($shipper:expr, $($arg:tt)+) => {
        $crate::log!($shipper, $crate::LogLevel::Failure, $($arg)+)
    };
}
