use serde::{Deserialize, Serialize};

use crate::codec;
use crate::constants::MAX_PREV_MESSAGE_TEXTS;
use crate::error::ModelError;
use crate::types::{StudyMaterialId, UserId};

/// One attachment upload submitted for study-material classification.
///
/// Immutable once built; the bounded context travels with it so the daemon
/// never has to query the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentToParse {
    pub filename: String,
    pub author_id: UserId,
    #[serde(default)]
    pub curr_message_text: String,
    /// Previous message texts of the conversation, newest first.
    #[serde(rename = "prev_messages_texts", default)]
    pub prev_message_texts: Vec<String>,
}

impl AttachmentToParse {
    pub fn new(
        filename: impl Into<String>,
        author_id: UserId,
        curr_message_text: impl Into<String>,
        prev_message_texts: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            author_id,
            curr_message_text: curr_message_text.into(),
            prev_message_texts: prev_message_texts
                .into_iter()
                .take(MAX_PREV_MESSAGE_TEXTS)
                .collect(),
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, ModelError> {
        codec::decode(data)
    }

    pub fn encode(&self) -> Result<Vec<u8>, ModelError> {
        codec::encode(self)
    }
}

/// A catalogued file that the tagging collaborator recognised as study material.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StudyMaterial {
    pub id: StudyMaterialId,
    pub name: String,
    pub filename: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub author_id: UserId,
    pub created: i64,
    pub updated: i64,
}

impl StudyMaterial {
    pub fn new(
        name: impl Into<String>,
        filename: impl Into<String>,
        tags: Vec<String>,
        author_id: UserId,
        now: i64,
    ) -> Self {
        Self {
            id: StudyMaterialId::new(),
            name: name.into(),
            filename: filename.into(),
            tags,
            author_id,
            created: now,
            updated: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_is_bounded() {
        let prev = (0..12).map(|i| format!("msg {i}"));
        let unit = AttachmentToParse::new("notes.pdf", UserId::from("alice"), "see file", prev);
        assert_eq!(unit.prev_message_texts.len(), MAX_PREV_MESSAGE_TEXTS);
        assert_eq!(unit.prev_message_texts[0], "msg 0");
    }

    #[test]
    fn test_wire_field_names() {
        let unit = AttachmentToParse::new(
            "notes.pdf",
            UserId::from("alice"),
            "see file",
            vec!["earlier".to_string()],
        );
        let json: serde_json::Value = serde_json::from_slice(&unit.encode().unwrap()).unwrap();
        assert_eq!(json["filename"], "notes.pdf");
        assert_eq!(json["author_id"], "alice");
        assert_eq!(json["prev_messages_texts"][0], "earlier");
    }

    #[test]
    fn test_decode_garbage_is_error() {
        assert!(matches!(
            AttachmentToParse::decode(b"not json"),
            Err(ModelError::Decode(_))
        ));
    }
}
