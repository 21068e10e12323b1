use std::collections::HashMap;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::BusError;

/// Metadata key carrying the correlation id across handlers and processes.
pub const CORRELATION_ID_KEY: &str = "correlation_id";

/// One unit on the bus: the raw JSON bytes of a domain entity plus metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub uuid: Uuid,
    /// Broker partition key. A random per-publish key is used when absent.
    pub key: Option<String>,
    pub payload: Bytes,
    pub metadata: HashMap<String, String>,
}

impl BusMessage {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            key: None,
            payload: payload.into(),
            metadata: HashMap::new(),
        }
    }

    /// Encode `value` as JSON into a fresh message.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, BusError> {
        Ok(Self::new(serde_json::to_vec(value)?))
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Key actually handed to the broker.
    pub fn partition_key(&self) -> String {
        self.key.clone().unwrap_or_else(|| self.uuid.to_string())
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.metadata.get(CORRELATION_ID_KEY).map(String::as_str)
    }

    pub fn set_correlation_id(&mut self, id: impl Into<String>) {
        self.metadata.insert(CORRELATION_ID_KEY.to_string(), id.into());
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_key_falls_back_to_uuid() {
        let msg = BusMessage::new(&b"{}"[..]);
        assert_eq!(msg.partition_key(), msg.uuid.to_string());

        let keyed = BusMessage::new(&b"{}"[..]).with_key("channel:1");
        assert_eq!(keyed.partition_key(), "channel:1");
    }

    #[test]
    fn test_json_payload() {
        let msg = BusMessage::json(&serde_json::json!({"a": 1})).unwrap();
        let back: serde_json::Value = msg.decode().unwrap();
        assert_eq!(back["a"], 1);
        assert!(msg.correlation_id().is_none());
    }
}
