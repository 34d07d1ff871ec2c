//! Log record structure

use super::log_level::LogLevel;
use super::payload::Payload;
use super::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// One structured log event.
///
/// Records are built by the producer and never mutated once handed to the
/// shipper; ownership moves from the intake queue to a batch and ends in a
/// delivered, failed or dropped state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: Timestamp,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
}

impl LogRecord {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Timestamp::now(),
            level,
            message: message.into(),
            payload: None,
            tags: None,
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.payload
            .get_or_insert_with(Payload::new)
            .insert(key, value);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.get_or_insert_with(BTreeSet::new).insert(tag.into());
        self
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let set = self.tags.get_or_insert_with(BTreeSet::new);
        set.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Message with line breaks and tabs escaped, safe for single-line output
    ///
    /// Prevents a crafted message from forging extra lines on a console.
    pub fn sanitized_message(&self) -> String {
        self.message
            .replace('\n', "\\n")
            .replace('\r', "\\r")
            .replace('\t', "\\t")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let record = LogRecord::new(LogLevel::Warning, "disk almost full")
            .with_field("free_mb", 12)
            .with_tag("storage");

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["level"], json!(30));
        assert_eq!(value["message"], json!("disk almost full"));
        assert_eq!(value["payload"], json!({"free_mb": 12}));
        assert_eq!(value["tags"], json!(["storage"]));
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_optional_fields_omitted() {
        let record = LogRecord::new(LogLevel::Info, "plain");
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("payload").is_none());
        assert!(value.get("tags").is_none());
    }

    #[test]
    fn test_tags_deduplicated() {
        let record = LogRecord::new(LogLevel::Info, "x").with_tags(["a", "b", "a"]);
        assert_eq!(record.tags.unwrap().len(), 2);
    }

    #[test]
    fn test_sanitized_message() {
        let record = LogRecord::new(LogLevel::Info, "login\nERROR forged\tline");
        assert_eq!(record.sanitized_message(), "login\\nERROR forged\\tline");
        assert_eq!(record.message, "login\nERROR forged\tline");
    }
}
