//! JSON bodies exchanged with the AI collaborators.

use serde::{Deserialize, Serialize};

use crate::study_material::AttachmentToParse;

// --- speech to text ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoiceRecognitionRequest {
    pub bucket: String,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoiceRecognitionResponse {
    pub text: String,
}

// --- attachment tagging ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentClassificationRequest {
    pub file_id: String,
    pub bucket_name: String,
    pub author_id: String,
    pub curr_message_text: String,
    pub prev_messages_texts: Vec<String>,
}

impl AttachmentClassificationRequest {
    pub fn from_attachment(unit: &AttachmentToParse, bucket: impl Into<String>) -> Self {
        Self {
            file_id: unit.filename.clone(),
            bucket_name: bucket.into(),
            author_id: unit.author_id.to_string(),
            curr_message_text: unit.curr_message_text.clone(),
            prev_messages_texts: unit.prev_message_texts.clone(),
        }
    }
}

/// Name and tags inferred by the classifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DerivedStudyMaterial {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParsedAttachment {
    pub is_study_material: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_material: Option<DerivedStudyMaterial>,
}

// --- structurization ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StructurizationRequest {
    pub query: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StructurizedMessage {
    pub explanation: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;

    #[test]
    fn test_classification_request_from_unit() {
        let unit = AttachmentToParse::new("notes.pdf", UserId::from("alice"), "here", vec![]);
        let req = AttachmentClassificationRequest::from_attachment(&unit, "attachments");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["file_id"], "notes.pdf");
        assert_eq!(json["bucket_name"], "attachments");
        assert_eq!(json["author_id"], "alice");
    }

    #[test]
    fn test_negative_classification_without_material() {
        let parsed: ParsedAttachment =
            serde_json::from_str(r#"{"is_study_material":false}"#).unwrap();
        assert!(!parsed.is_study_material);
        assert!(parsed.study_material.is_none());
    }
}
