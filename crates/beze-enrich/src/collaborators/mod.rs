//! External AI collaborators and their HTTP clients.

mod http;
pub mod structurizer;
pub mod tagger;
pub mod voice;

use async_trait::async_trait;
use beze_shared::collaborators::ParsedAttachment;
use beze_shared::AttachmentToParse;

use crate::error::EnrichmentError;

pub use http::JsonClient;
pub use structurizer::HttpStructurizer;
pub use tagger::HttpAttachmentClassifier;
pub use voice::HttpSpeechToText;

/// Speech-to-text over a clip already uploaded to object storage.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, bucket: &str, filename: &str) -> Result<String, EnrichmentError>;
}

/// Decides whether an uploaded attachment is study material.
#[async_trait]
pub trait AttachmentClassifier: Send + Sync {
    async fn classify(&self, unit: &AttachmentToParse) -> Result<ParsedAttachment, EnrichmentError>;
}

/// Produces an explanation of an answer given the question it replies to.
#[async_trait]
pub trait Structurizer: Send + Sync {
    async fn structurize(&self, query: &str, answer: &str) -> Result<String, EnrichmentError>;
}
