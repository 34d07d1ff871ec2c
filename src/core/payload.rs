//! Structured payload attached to log records
//!
//! A `Payload` is a schema-less key-value mapping. The pipeline never looks
//! inside it; only the collector interprets its contents.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload {
    fields: BTreeMap<String, Value>,
}

impl Payload {
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    /// Add a field to the payload
    pub fn with_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Add a field to the payload (mutable version)
    pub fn insert<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Basic description of the host process, used as handshake metadata
    /// when the configuration does not supply any.
    pub fn environment() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get() as u64)
            .unwrap_or(1);

        let mut payload = Payload::new()
            .with_field("os", std::env::consts::OS)
            .with_field("family", std::env::consts::FAMILY)
            .with_field("arch", std::env::consts::ARCH)
            .with_field("pid", std::process::id())
            .with_field("cpu_count", parallelism)
            .with_field("shipper_version", env!("CARGO_PKG_VERSION"));

        if let Some(host) = ["HOSTNAME", "COMPUTERNAME"]
            .iter()
            .find_map(|var| std::env::var(var).ok())
        {
            payload.insert("hostname", host);
        }

        payload
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Display for Payload {
    /// Compact JSON with sorted keys
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.fields) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "{{}}"),
        }
    }
}
