//! # beze-shared
//!
//! Domain model shared by the chat service and the enrichment daemons:
//! identities, channels, messages, attachment work units, study materials,
//! and the JSON payloads exchanged with the AI collaborators.

pub mod chat;
pub mod codec;
pub mod collaborators;
pub mod constants;
pub mod error;
pub mod study_material;
pub mod types;

pub use chat::{Channel, Event, Message};
pub use error::ModelError;
pub use study_material::{AttachmentToParse, StudyMaterial};
pub use types::{ChannelId, MessageId, SessionId, StudyMaterialId, UserId};

/// Current unix time in seconds, the timestamp unit used by every model.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
