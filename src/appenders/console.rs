//! Console appender implementation

use crate::core::{Appender, LogLevel, LogRecord, Result, ShipperConfig, TimestampFormat};
use chrono::Utc;
#[cfg(feature = "console")]
use colored::Colorize;

/// Renders records as `[timestamp] LEVEL    - message {payload} #tags`
pub struct ConsoleAppender {
    use_colors: bool,
    timestamp_format: TimestampFormat,
}

impl ConsoleAppender {
    pub fn new() -> Self {
        Self {
            use_colors: true,
            timestamp_format: TimestampFormat::default(),
        }
    }

    pub fn with_colors(use_colors: bool) -> Self {
        Self {
            use_colors,
            timestamp_format: TimestampFormat::default(),
        }
    }

    /// Colors and date pattern taken from the shipper configuration
    pub fn from_config(config: &ShipperConfig) -> Self {
        Self {
            use_colors: config.use_colors,
            timestamp_format: TimestampFormat::from_pattern(&config.date_format),
        }
    }

    /// Set the timestamp format for this appender
    ///
    /// # Examples
    ///
    /// ```
    /// use rust_log_shipper::appenders::ConsoleAppender;
    /// use rust_log_shipper::TimestampFormat;
    ///
    /// let appender = ConsoleAppender::new()
    ///     .with_timestamp_format(TimestampFormat::Iso8601Micros);
    /// ```
    #[must_use]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    /// One console line for `record`, without a trailing newline
    pub fn format_record(&self, record: &LogRecord) -> String {
        let mut line = format!(
            "[{}] {} - {}",
            self.timestamp_format.format(&record.timestamp.wall()),
            self.level_label(record.level),
            record.sanitized_message()
        );

        if let Some(ref payload) = record.payload {
            if !payload.is_empty() {
                line.push(' ');
                line.push_str(&payload.to_string());
            }
        }
        if let Some(ref tags) = record.tags {
            for tag in tags {
                line.push_str(" #");
                line.push_str(tag);
            }
        }
        line
    }

    #[cfg(feature = "console")]
    fn level_label(&self, level: LogLevel) -> String {
        let label = format!("{:<8}", level.to_str());
        if self.use_colors {
            label.color(level.color_code()).to_string()
        } else {
            label
        }
    }

    #[cfg(not(feature = "console"))]
    fn level_label(&self, level: LogLevel) -> String {
        let _ = self.use_colors;
        format!("{:<8}", level.to_str())
    }
}

impl Default for ConsoleAppender {
    fn default() -> Self {
        Self::new()
    }
}

impl Appender for ConsoleAppender {
    fn append(&self, record: &LogRecord) -> Result<()> {
        let output = self.format_record(record);

        // Error and above go to stderr, everything else to stdout
        match record.level {
            LogLevel::Error | LogLevel::Critical | LogLevel::Failure => eprintln!("{}", output),
            _ => println!("{}", output),
        }
        Ok(())
    }

    fn warn(&self, message: &str) -> Result<()> {
        eprintln!(
            "[{}] {} - {}",
            self.timestamp_format.format(&Utc::now()),
            self.level_label(LogLevel::Warning),
            message
        );
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        use std::io::Write;
        std::io::stdout().flush()?;
        std::io::stderr().flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}
