use std::time::Duration;

use async_trait::async_trait;
use beze_shared::collaborators::{VoiceRecognitionRequest, VoiceRecognitionResponse};

use super::{JsonClient, SpeechToText};
use crate::error::EnrichmentError;

/// Transcription service client: `POST {base}/transcribe/`.
pub struct HttpSpeechToText {
    client: JsonClient,
}

impl HttpSpeechToText {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            client: JsonClient::new("voice-recognition", base_url, request_timeout),
        }
    }
}

#[async_trait]
impl SpeechToText for HttpSpeechToText {
    async fn transcribe(&self, bucket: &str, filename: &str) -> Result<String, EnrichmentError> {
        let request = VoiceRecognitionRequest {
            bucket: bucket.to_string(),
            filename: filename.to_string(),
        };
        let response: VoiceRecognitionResponse = self.client.post("/transcribe/", &request).await?;
        Ok(response.text)
    }
}
