//! Shipper configuration
//!
//! `ShipperConfig` is plain data: the host loads it however it likes (any
//! serde format, or the builder) and the shipper validates it once at start.
//! Durations travel as fractional seconds.

use super::backpressure::BackpressurePolicy;
use super::error::{Result, ShipperError};
use super::log_level::LogLevel;
use super::payload::Payload;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

pub const DEFAULT_SERVER_URL: &str = "wss://api.codewatchman.com/v1/logs";
pub const DEFAULT_QUEUE_SIZE: usize = 1000;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Upper bound for every duration option
pub const MAX_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShipperConfig {
    pub project_id: Option<String>,
    pub project_secret: Option<String>,
    pub server_url: String,
    pub queue_size: usize,
    /// Transmission attempts per batch before its records are marked failed
    pub retry_attempts: u32,
    /// Base delay of the exponential backoff
    #[serde(with = "secs")]
    pub retry_delay: Duration,
    /// Ceiling for every collector round trip (handshake, ack, pong)
    #[serde(with = "secs")]
    pub timeout: Duration,
    pub max_batch_size: usize,
    #[serde(with = "secs")]
    pub flush_interval: Duration,
    #[serde(with = "secs")]
    pub heartbeat_interval: Duration,
    #[serde(with = "secs")]
    pub max_backoff: Duration,
    pub backpressure_policy: BackpressurePolicy,
    /// Minimum level passed on by the producer API
    pub level: LogLevel,
    pub console_output: bool,
    pub use_colors: bool,
    pub date_format: String,
    /// Handshake metadata; a basic environment description when absent
    pub metadata: Option<Payload>,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            project_secret: None,
            server_url: DEFAULT_SERVER_URL.to_string(),
            queue_size: DEFAULT_QUEUE_SIZE,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            timeout: DEFAULT_TIMEOUT,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            max_backoff: DEFAULT_MAX_BACKOFF,
            backpressure_policy: BackpressurePolicy::default(),
            level: LogLevel::Info,
            console_output: true,
            use_colors: true,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            metadata: None,
        }
    }
}

impl ShipperConfig {
    #[must_use]
    pub fn builder() -> ShipperConfigBuilder {
        ShipperConfigBuilder::new()
    }

    /// Parse a JSON document; missing keys take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Both project id and secret are present and non-empty
    pub fn has_credentials(&self) -> bool {
        fn present(value: &Option<String>) -> bool {
            value.as_deref().is_some_and(|v| !v.trim().is_empty())
        }
        present(&self.project_id) && present(&self.project_secret)
    }

    /// Check every option; called by the shipper before anything starts
    pub fn validate(&self) -> Result<()> {
        self.validate_credentials()?;
        self.parsed_server_url()?;

        if self.queue_size == 0 {
            return Err(ShipperError::config("queue", "queue_size must be positive"));
        }
        if self.max_batch_size == 0 {
            return Err(ShipperError::config(
                "worker",
                "max_batch_size must be positive",
            ));
        }
        if self.timeout.is_zero() {
            return Err(ShipperError::config("connection", "timeout must be positive"));
        }
        if self.flush_interval.is_zero() {
            return Err(ShipperError::config(
                "worker",
                "flush_interval must be positive",
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ShipperError::config(
                "connection",
                "heartbeat_interval must be positive",
            ));
        }
        for (component, name, value) in [
            ("connection", "timeout", self.timeout),
            ("connection", "heartbeat_interval", self.heartbeat_interval),
            ("worker", "flush_interval", self.flush_interval),
            ("backoff", "retry_delay", self.retry_delay),
            ("backoff", "max_backoff", self.max_backoff),
        ] {
            if value > MAX_INTERVAL {
                return Err(ShipperError::config(
                    component,
                    format!("{} ({:?}) must not exceed {:?}", name, value, MAX_INTERVAL),
                ));
            }
        }
        if self.max_backoff < self.retry_delay {
            return Err(ShipperError::config(
                "backoff",
                format!(
                    "max_backoff ({:?}) must not be below retry_delay ({:?})",
                    self.max_backoff, self.retry_delay
                ),
            ));
        }
        Ok(())
    }

    /// Server URL parsed and checked for a WebSocket scheme and a host
    pub fn parsed_server_url(&self) -> Result<Url> {
        let url = Url::parse(&self.server_url).map_err(|e| {
            ShipperError::config("server_url", format!("'{}': {}", self.server_url, e))
        })?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ShipperError::config(
                "server_url",
                "server_url must use ws:// or wss:// protocol",
            ));
        }
        if url.host_str().is_none() {
            return Err(ShipperError::config("server_url", "server_url has no host"));
        }
        Ok(url)
    }

    fn validate_credentials(&self) -> Result<()> {
        let id = self.project_id.as_deref().map(str::trim).unwrap_or("");
        let secret = self.project_secret.as_deref().map(str::trim).unwrap_or("");
        if id.is_empty() != secret.is_empty() {
            return Err(ShipperError::config(
                "credentials",
                "project_id and project_secret must be set together",
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ShipperConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShipperConfig")
            .field("project_id", &self.project_id)
            .field(
                "project_secret",
                &self.project_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("server_url", &self.server_url)
            .field("queue_size", &self.queue_size)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay", &self.retry_delay)
            .field("timeout", &self.timeout)
            .field("max_batch_size", &self.max_batch_size)
            .field("flush_interval", &self.flush_interval)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("max_backoff", &self.max_backoff)
            .field("backpressure_policy", &self.backpressure_policy)
            .field("level", &self.level)
            .field("console_output", &self.console_output)
            .field("use_colors", &self.use_colors)
            .field("date_format", &self.date_format)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Builder for [`ShipperConfig`]
///
/// # Example
///
/// ```
/// use rust_log_shipper::{BackpressurePolicy, ShipperConfig};
/// use std::time::Duration;
///
/// let config = ShipperConfig::builder()
///     .credentials("my-project", "s3cret")
///     .server_url("ws://localhost:8787/log")
///     .queue_size(500)
///     .backpressure_policy(BackpressurePolicy::DropNewest)
///     .timeout(Duration::from_secs(2))
///     .build();
///
/// assert!(config.has_credentials());
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ShipperConfigBuilder {
    config: ShipperConfig,
}

impl ShipperConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ShipperConfig::default(),
        }
    }

    #[must_use = "builder methods return a new value"]
    pub fn credentials(mut self, project_id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.config.project_id = Some(project_id.into());
        self.config.project_secret = Some(secret.into());
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into();
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn queue_size(mut self, size: usize) -> Self {
        self.config.queue_size = size;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.config.retry_attempts = attempts;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.max_batch_size = size;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval = interval;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn max_backoff(mut self, max: Duration) -> Self {
        self.config.max_backoff = max;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn backpressure_policy(mut self, policy: BackpressurePolicy) -> Self {
        self.config.backpressure_policy = policy;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn console_output(mut self, enabled: bool) -> Self {
        self.config.console_output = enabled;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn use_colors(mut self, enabled: bool) -> Self {
        self.config.use_colors = enabled;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn date_format(mut self, pattern: impl Into<String>) -> Self {
        self.config.date_format = pattern.into();
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn metadata(mut self, metadata: Payload) -> Self {
        self.config.metadata = Some(metadata);
        self
    }

    pub fn build(self) -> ShipperConfig {
        self.config
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let seconds = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(seconds).map_err(serde::de::Error::custom)
    }
}
