use std::time::Duration;

use async_trait::async_trait;
use beze_shared::collaborators::{AttachmentClassificationRequest, ParsedAttachment};
use beze_shared::AttachmentToParse;

use super::{AttachmentClassifier, JsonClient};
use crate::error::EnrichmentError;

/// Attachment tagging service client: `POST {base}/set-tag`.
pub struct HttpAttachmentClassifier {
    client: JsonClient,
    bucket: String,
}

impl HttpAttachmentClassifier {
    pub fn new(base_url: impl Into<String>, bucket: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            client: JsonClient::new("attachment-tagger", base_url, request_timeout),
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl AttachmentClassifier for HttpAttachmentClassifier {
    async fn classify(&self, unit: &AttachmentToParse) -> Result<ParsedAttachment, EnrichmentError> {
        let request = AttachmentClassificationRequest::from_attachment(unit, self.bucket.clone());
        self.client.post("/set-tag", &request).await
    }
}
