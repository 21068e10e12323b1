use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::ModelError;
use crate::types::{ChannelId, MessageId, UserId};

/// Semantic kind of a message. Determines both how it is persisted and where
/// it is routed; the set is closed and an unknown tag fails decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    /// Plain text, possibly with attachments.
    Text,
    /// Request to structurize an earlier message (and its re-broadcast once
    /// the explanation is available).
    Structurization,
    /// Voice note awaiting transcription.
    Voice,
    /// Voice note whose transcription is now available.
    VoiceRecognized,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Text => "text",
            Event::Structurization => "structurization",
            Event::Voice => "voice",
            Event::VoiceRecognized => "voice_recognized",
        }
    }
}

impl std::str::FromStr for Event {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Event::Text),
            "structurization" => Ok(Event::Structurization),
            "voice" => Ok(Event::Voice),
            "voice_recognized" => Ok(Event::VoiceRecognized),
            other => Err(ModelError::UnknownEvent(other.to_string())),
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// A conversation between a fixed set of participants.
///
/// `user_ids` is always kept sorted and free of duplicates so that looking a
/// channel up by an unordered participant set is a plain equality check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    #[serde(rename = "channel_id")]
    pub id: ChannelId,
    pub user_ids: Vec<UserId>,
    pub created: i64,
    pub updated: i64,
}

impl Channel {
    /// Build a new channel with a fresh id from an unordered participant set.
    pub fn with_participants(
        participants: impl IntoIterator<Item = UserId>,
        now: i64,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            id: ChannelId::new(),
            user_ids: Self::canonical_participants(participants)?,
            created: now,
            updated: now,
        })
    }

    /// Sort and deduplicate a participant set, rejecting empty identities and
    /// sets with fewer than two distinct members.
    pub fn canonical_participants(
        participants: impl IntoIterator<Item = UserId>,
    ) -> Result<Vec<UserId>, ModelError> {
        let set: BTreeSet<UserId> = participants.into_iter().collect();
        if set.iter().any(UserId::is_empty) {
            return Err(ModelError::EmptyIdentity);
        }
        if set.len() < 2 {
            return Err(ModelError::NotEnoughParticipants(set.len()));
        }
        Ok(set.into_iter().collect())
    }

    /// Storage key of the participant set; equal for equal unordered sets.
    pub fn participants_key(user_ids: &[UserId]) -> String {
        user_ids
            .iter()
            .map(UserId::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn has_participant(&self, user: &UserId) -> bool {
        self.user_ids.binary_search(user).is_ok()
    }

    pub fn encode(&self) -> Result<Vec<u8>, ModelError> {
        codec::encode(self)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A chat message as it travels over live connections and the bus.
///
/// `receiver_ids` is delivery metadata: it is computed at send time from the
/// channel participants, used by the outbound fan-out, and never persisted
/// nor written to a live session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,
    #[serde(default)]
    pub user_id: UserId,
    /// Counterpart used to resolve a two-party channel when `channel_id` is
    /// not known yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub receiver_ids: BTreeSet<UserId>,
    #[serde(default)]
    pub payload: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub structurized: String,
    /// Object storage key of an attached voice clip.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub voice: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub voice_duration: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub recognized_voice: String,
    /// Object storage keys of attached files.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    pub event: Event,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

impl Message {
    /// A bare message of the given kind; every other field is empty.
    pub fn new(event: Event, user_id: UserId, payload: impl Into<String>) -> Self {
        Self {
            message_id: None,
            channel_id: None,
            user_id,
            peer_id: None,
            receiver_ids: BTreeSet::new(),
            payload: payload.into(),
            structurized: String::new(),
            voice: String::new(),
            voice_duration: 0,
            recognized_voice: String::new(),
            attachments: Vec::new(),
            event,
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, ModelError> {
        codec::decode(data)
    }

    pub fn encode(&self) -> Result<Vec<u8>, ModelError> {
        codec::encode(self)
    }

    pub fn set_receivers(&mut self, receivers: impl IntoIterator<Item = UserId>) {
        self.receiver_ids = receivers.into_iter().collect();
    }

    pub fn is_addressed_to(&self, user: &UserId) -> bool {
        self.receiver_ids.contains(user)
    }

    /// Copy of the message as it may be written to a live session.
    pub fn to_wire(&self) -> Message {
        let mut wire = self.clone();
        wire.receiver_ids.clear();
        wire
    }
}
