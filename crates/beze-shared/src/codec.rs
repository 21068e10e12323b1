//! JSON codecs. Every entity crosses the broker and the live connections as
//! the raw bytes of its JSON encoding.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ModelError;

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ModelError> {
    serde_json::to_vec(value).map_err(ModelError::Encode)
}

pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, ModelError> {
    serde_json::from_slice(data).map_err(ModelError::Decode)
}
