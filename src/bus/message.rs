use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const CONTENT_TYPE_HEADER: &str = "content-type";
pub const TIMESTAMP_HEADER: &str = "timestamp";
pub const PARTITION_HEADER: &str = "partition";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Body of every message published for a computed sum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumEvent {
    pub sum: i32,
    #[serde(with = "rfc3339")]
    pub timestamp: DateTime<Utc>,
}

impl SumEvent {
    pub fn new(sum: i32, timestamp: DateTime<Utc>) -> Self {
        Self { sum, timestamp }
    }
}

/// A fully encoded message, ready for a `BusWriter`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub key: String,
    pub value: Vec<u8>,
    pub headers: Vec<(String, String)>,
    /// `None` lets the bus client pick the partition.
    pub partition: Option<i32>,
}

impl BusMessage {
    /// First header value with the given name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }

    /// Decode the JSON body.
    pub fn decode(&self) -> Result<SumEvent, serde_json::Error> {
        serde_json::from_slice(&self.value)
    }
}

/// RFC 3339 with whole seconds and a `Z` suffix.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

mod rfc3339 {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
