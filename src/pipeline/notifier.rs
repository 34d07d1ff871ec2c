//! Local reporting: record rendering, pipeline warnings, drop alerts
//!
//! Shared by producer threads (rendering, drop alerts) and the worker
//! (warnings). Appender failures never reach the pipeline; they are
//! reported on stderr and forgotten.

use crate::core::{Appender, BackpressurePolicy, DropCallback, LogRecord};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Drop alerts fire on the first drop and then once per this many drops
pub const DROP_ALERT_INTERVAL: u64 = 1000;

pub(crate) struct Notifier {
    appenders: Vec<Arc<dyn Appender>>,
    on_drop: Option<DropCallback>,
}

impl Notifier {
    pub(crate) fn new(appenders: Vec<Arc<dyn Appender>>, on_drop: Option<DropCallback>) -> Self {
        Self { appenders, on_drop }
    }

    /// Hand a record to every appender with per-appender panic isolation
    pub(crate) fn render(&self, record: &LogRecord) {
        for appender in &self.appenders {
            match catch_unwind(AssertUnwindSafe(|| appender.append(record))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    eprintln!("[SHIPPER ERROR] Appender '{}' failed: {}", appender.name(), e);
                }
                Err(panic) => {
                    eprintln!(
                        "[SHIPPER CRITICAL] Appender '{}' panicked: {}. \
                         Other appenders continue to function.",
                        appender.name(),
                        panic_message(panic.as_ref())
                    );
                }
            }
        }
    }

    /// Pipeline warning for the host; also traced
    pub(crate) fn warn(&self, message: &str) {
        tracing::warn!(target: "rust_log_shipper", "{}", message);

        if self.appenders.is_empty() {
            eprintln!("[SHIPPER WARNING] {}", message);
            return;
        }

        for appender in &self.appenders {
            match catch_unwind(AssertUnwindSafe(|| appender.warn(message))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    eprintln!("[SHIPPER WARNING] {} (appender '{}' failed: {})", message, appender.name(), e);
                }
                Err(panic) => {
                    eprintln!(
                        "[SHIPPER WARNING] {} (appender '{}' panicked: {})",
                        message,
                        appender.name(),
                        panic_message(panic.as_ref())
                    );
                }
            }
        }
    }

    /// Alert on intake drops.
    ///
    /// `drops` records were just dropped, bringing the total to
    /// `total_dropped`. Alerts on the first drop and whenever the total
    /// crosses a multiple of [`DROP_ALERT_INTERVAL`].
    pub(crate) fn report_drops(&self, drops: u64, total_dropped: u64, policy: BackpressurePolicy) {
        if drops == 0 || !should_alert(total_dropped - drops, total_dropped) {
            return;
        }

        self.warn(&format!(
            "Intake queue full ({}), {} records dropped. \
             Consider increasing queue_size or flushing more often.",
            policy, total_dropped
        ));

        if let Some(ref callback) = self.on_drop {
            if catch_unwind(AssertUnwindSafe(|| callback(total_dropped))).is_err() {
                eprintln!("[SHIPPER ERROR] Drop callback panicked");
            }
        }
    }

    pub(crate) fn flush(&self) {
        for appender in &self.appenders {
            match catch_unwind(AssertUnwindSafe(|| appender.flush())) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    eprintln!("[SHIPPER ERROR] Appender '{}' flush failed: {}", appender.name(), e);
                }
                Err(_) => {
                    eprintln!("[SHIPPER CRITICAL] Appender '{}' panicked during flush", appender.name());
                }
            }
        }
    }
}

fn should_alert(before: u64, after: u64) -> bool {
    before == 0 || after / DROP_ALERT_INTERVAL > before / DROP_ALERT_INTERVAL
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LogLevel, Result, ShipperError};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct Recording {
        records: Mutex<Vec<String>>,
        warnings: Mutex<Vec<String>>,
    }

    impl Appender for Recording {
        fn append(&self, record: &LogRecord) -> Result<()> {
            self.records.lock().push(record.message.clone());
            Ok(())
        }

        fn warn(&self, message: &str) -> Result<()> {
            self.warnings.lock().push(message.to_string());
            Ok(())
        }

        fn flush(&self) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct Broken;

    impl Appender for Broken {
        fn append(&self, _record: &LogRecord) -> Result<()> {
            panic!("boom");
        }

        fn warn(&self, _message: &str) -> Result<()> {
            Err(ShipperError::appender("broken", "always fails"))
        }

        fn flush(&self) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    #[test]
    fn test_panicking_appender_is_isolated() {
        let recording = Arc::new(Recording::default());
        let notifier = Notifier::new(vec![Arc::new(Broken), recording.clone()], None);

        notifier.render(&LogRecord::new(LogLevel::Info, "survives"));
        notifier.warn("still reported");

        assert_eq!(*recording.records.lock(), ["survives"]);
        assert_eq!(*recording.warnings.lock(), ["still reported"]);
    }

    #[test]
    fn test_alert_schedule() {
        assert!(should_alert(0, 1));
        assert!(!should_alert(1, 2));
        assert!(!should_alert(998, 999));
        assert!(should_alert(999, 1000));
        assert!(should_alert(1500, 2001));
        assert!(!should_alert(2001, 2500));
    }

    #[test]
    fn test_drop_callback_receives_total() {
        let seen = Arc::new(AtomicU64::new(0));
        let seen_clone = Arc::clone(&seen);
        let recording = Arc::new(Recording::default());
        let notifier = Notifier::new(
            vec![recording.clone()],
            Some(Arc::new(move |count| seen_clone.store(count, Ordering::SeqCst))),
        );

        notifier.report_drops(1, 1, BackpressurePolicy::DropOldest);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        notifier.report_drops(1, 2, BackpressurePolicy::DropOldest);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(recording.warnings.lock().len(), 1);
        assert!(recording.warnings.lock()[0].contains("drop_oldest"));
    }
}
