//! Message envelope for pub/sub

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Message envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message ID (UUIDv7 for ordering)
    pub id: Uuid,

    /// Payload (JSON-serialized)
    pub payload: serde_json::Value,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Correlation ID (for tracing)
    #[serde(default)]
    pub correlation_id: Option<String>,

    /// Headers (metadata)
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Message {
    /// Create new message
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            payload,
            timestamp: Utc::now(),
            correlation_id: None,
            headers: HashMap::new(),
        }
    }

    /// Create a message from any serializable payload
    pub fn from_payload<T: Serialize>(payload: &T) -> crate::Result<Self> {
        Ok(Self::new(serde_json::to_value(payload)?))
    }

    /// Set correlation ID
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Add header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Header lookup
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Decode the payload into a concrete type
    pub fn decode<T: DeserializeOwned>(&self) -> crate::Result<T> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| crate::Error::Deserialization(e.to_string()))
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> crate::Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| crate::Error::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_creation() {
        let msg = Message::new(json!({"amount": 1000})).with_correlation_id("e2e-1");

        assert_eq!(msg.payload["amount"], 1000);
        assert_eq!(msg.correlation_id.as_deref(), Some("e2e-1"));
    }

    #[test]
    fn test_message_bytes() {
        let msg = Message::new(json!({"test": "data"})).with_header("family", "pacs.002");

        let bytes = msg.to_bytes().unwrap();
        let deserialized = Message::from_bytes(&bytes).unwrap();

        assert_eq!(msg, deserialized);
        assert_eq!(deserialized.header("family"), Some("pacs.002"));
    }

    #[test]
    fn test_decode_mismatch() {
        let msg = Message::new(json!("not an object"));
        let decoded: crate::Result<HashMap<String, String>> = msg.decode();
        assert!(matches!(decoded, Err(crate::Error::Deserialization(_))));
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        assert!(Message::from_bytes(b"{not json").is_err());
    }
}
