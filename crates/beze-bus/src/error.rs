use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Subscribe to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Handler already registered: {0}")]
    DuplicateHandler(String),

    #[error("Bus backend not available in this build: {0}")]
    BackendUnavailable(String),

    #[error("Bus is closed")]
    Closed,
}

/// Failure of one message delivery to one handler. Never stops the consumer.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Handler timed out after {0:?}")]
    Timeout(Duration),

    #[error("Handler panicked: {0}")]
    Panicked(String),

    #[error("Undecodable payload: {0}")]
    Decode(String),

    #[error("Handler failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Bus(#[from] BusError),
}

impl HandlerError {
    pub fn failed(err: impl std::fmt::Display) -> Self {
        HandlerError::Failed(err.to_string())
    }
}
