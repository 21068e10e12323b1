//! Voice transcription daemon: raw voice messages in, `voice_recognized`
//! messages out on the delivery topic.

use std::sync::Arc;

use async_trait::async_trait;
use beze_shared::{unix_now, Event, Message};
use beze_store::MessageRepository;
use tracing::info;

use crate::collaborators::SpeechToText;
use crate::daemon::{Enricher, Outcome};
use crate::error::EnrichmentError;
use crate::retry::RetryPolicy;

pub struct VoiceRecognitionEnricher {
    speech: Arc<dyn SpeechToText>,
    messages: Arc<dyn MessageRepository>,
    retry: RetryPolicy,
    bucket: String,
}

impl VoiceRecognitionEnricher {
    pub fn new(
        speech: Arc<dyn SpeechToText>,
        messages: Arc<dyn MessageRepository>,
        retry: RetryPolicy,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            speech,
            messages,
            retry,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl Enricher for VoiceRecognitionEnricher {
    type Input = Message;

    fn name(&self) -> &'static str {
        "voicerecognitiond"
    }

    async fn enrich(&self, mut message: Message) -> Result<Outcome, EnrichmentError> {
        if message.voice.trim().is_empty() {
            return Err(EnrichmentError::InvalidInput("voice is empty".into()));
        }
        if message.message_id.is_none() {
            return Err(EnrichmentError::InvalidInput("voice message has no id".into()));
        }

        let speech = &self.speech;
        let bucket = self.bucket.as_str();
        let voice = message.voice.as_str();
        let text = self
            .retry
            .run("voice-recognition", move || speech.transcribe(bucket, voice))
            .await?;

        message.recognized_voice = text;
        message.updated_at = unix_now();
        self.messages.update_message(&message).await?;

        info!(
            message_id = ?message.message_id,
            channel_id = ?message.channel_id,
            chars = message.recognized_voice.len(),
            "Voice recognized"
        );

        message.event = Event::VoiceRecognized;
        Ok(Outcome::Publish(message))
    }
}
