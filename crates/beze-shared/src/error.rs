use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Decode error: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Encode error: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("A channel needs at least two distinct participants, got {0}")]
    NotEnoughParticipants(usize),

    #[error("Unrecognized event: {0}")]
    UnknownEvent(String),

    #[error("Empty user identity")]
    EmptyIdentity,
}
