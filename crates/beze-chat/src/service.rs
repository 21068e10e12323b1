//! Inbound frame handling.
//!
//! A frame is decoded into a [`Message`], stamped with the connection's
//! identity and dispatched on its [`Event`]. Every accepted message ends up
//! persisted and published on the delivery topic; live fan-out happens only
//! from the bus side (see [`crate::delivery`]), so a message reaches its
//! audience the same way whether it was sent to this process or another.

use std::sync::Arc;

use beze_bus::{BusMessage, Publisher};
use beze_enrich::collaborators::Structurizer;
use beze_enrich::RetryPolicy;
use beze_shared::constants::MAX_PREV_MESSAGE_TEXTS;
use beze_shared::{unix_now, AttachmentToParse, Channel, Event, Message, MessageId, UserId};
use beze_store::repository::{ChannelRepository, MessageRepository};
use beze_store::StoreError;
use tracing::{debug, error, info, warn};

use crate::error::ChatError;

/// Topics the service publishes on.
#[derive(Debug, Clone)]
pub struct ChatTopics {
    pub delivery: String,
    pub raw_voice: String,
    pub attachment: String,
}

pub struct ChatService {
    channels: Arc<dyn ChannelRepository>,
    messages: Arc<dyn MessageRepository>,
    publisher: Arc<dyn Publisher>,
    structurizer: Arc<dyn Structurizer>,
    structurization_retry: RetryPolicy,
    topics: ChatTopics,
}

impl ChatService {
    pub fn new(
        channels: Arc<dyn ChannelRepository>,
        messages: Arc<dyn MessageRepository>,
        publisher: Arc<dyn Publisher>,
        structurizer: Arc<dyn Structurizer>,
        structurization_retry: RetryPolicy,
        topics: ChatTopics,
    ) -> Self {
        Self {
            channels,
            messages,
            publisher,
            structurizer,
            structurization_retry,
            topics,
        }
    }

    /// Handle one inbound frame from `sender`'s live connection.
    ///
    /// Returns the message as accepted. On error nothing was published;
    /// the caller answers the sender with [`ChatError::frame`].
    pub async fn handle_frame(&self, sender: &UserId, data: &[u8]) -> Result<Message, ChatError> {
        let mut msg = Message::decode(data).map_err(|e| ChatError::Decode(e.to_string()))?;

        if msg.user_id.is_empty() {
            msg.user_id = sender.clone();
        } else if msg.user_id != *sender {
            warn!(
                claimed = %msg.user_id,
                authenticated = %sender,
                "Frame user id does not match the session, using the session identity"
            );
            msg.user_id = sender.clone();
        }
        msg.receiver_ids.clear();

        debug!(user = %msg.user_id, event = %msg.event, "Frame received");

        match msg.event {
            Event::Text => self.send_text(msg).await,
            Event::Voice => self.send_voice(msg).await,
            Event::Structurization => self.structurize(msg).await,
            Event::VoiceRecognized => Err(ChatError::BadRequest(
                "voice_recognized messages cannot be sent by clients".into(),
            )),
        }
    }

    async fn send_text(&self, msg: Message) -> Result<Message, ChatError> {
        if msg.payload.trim().is_empty() && msg.attachments.is_empty() {
            return Err(ChatError::BadRequest("empty message".into()));
        }
        let (msg, channel) = self.persist(msg).await?;
        self.publish_delivery(&msg, &channel).await;
        Ok(msg)
    }

    async fn send_voice(&self, msg: Message) -> Result<Message, ChatError> {
        if msg.voice.trim().is_empty() {
            return Err(ChatError::BadRequest("voice message without a voice key".into()));
        }
        let (msg, channel) = self.persist(msg).await?;
        self.publish_delivery(&msg, &channel).await;
        self.publish_keyed(&self.topics.raw_voice, &msg, &channel).await;
        Ok(msg)
    }

    /// Explain an earlier message using the message before it as the question.
    async fn structurize(&self, request: Message) -> Result<Message, ChatError> {
        let id = request
            .message_id
            .ok_or_else(|| ChatError::BadRequest("structurization requires a message_id".into()))?;

        let mut target = self.messages.get_message(id).await.map_err(|e| match e {
            StoreError::NotFound => ChatError::NotFound(format!("message {id}")),
            other => other.into(),
        })?;
        let channel_id = target
            .channel_id
            .ok_or_else(|| ChatError::Internal(format!("message {id} has no channel")))?;
        let channel = self.channels.get_channel(channel_id).await?;
        if !channel.has_participant(&request.user_id) {
            return Err(ChatError::Forbidden("not a member of this channel".into()));
        }

        let query = self
            .messages
            .previous_messages_before(id, 1)
            .await?
            .into_iter()
            .next()
            .map(|m| m.payload)
            .unwrap_or_default();
        let answer = if target.payload.is_empty() {
            target.recognized_voice.clone()
        } else {
            target.payload.clone()
        };

        let structurizer = self.structurizer.as_ref();
        let (q, a) = (query.as_str(), answer.as_str());
        let explanation = self
            .structurization_retry
            .run("structurization", move || structurizer.structurize(q, a))
            .await
            .map_err(|e| {
                error!(message_id = %id, error = %e, "Structurization failed");
                ChatError::ServiceUnavailable("structurization".into())
            })?;

        target.structurized = explanation;
        target.updated_at = unix_now();
        self.messages.update_message(&target).await?;

        target.event = Event::Structurization;
        target.set_receivers(channel.user_ids.iter().cloned());
        self.publish_delivery(&target, &channel).await;
        info!(message_id = %id, channel = %channel.id, "Message structurized");
        Ok(target)
    }

    /// Resolve the channel, stamp ids and timestamps, and store the message.
    /// Attachment work units are published here because they need the
    /// history as it was before this message.
    async fn persist(&self, mut msg: Message) -> Result<(Message, Channel), ChatError> {
        let channel = self.resolve_channel(&msg).await?;
        let now = unix_now();

        msg.message_id = Some(MessageId::new());
        msg.channel_id = Some(channel.id);
        msg.peer_id = None;
        msg.created_at = now;
        msg.updated_at = now;

        let prev_texts = if msg.attachments.is_empty() {
            Vec::new()
        } else {
            self.messages
                .previous_messages(channel.id, now, MAX_PREV_MESSAGE_TEXTS as u32)
                .await?
                .into_iter()
                .map(|m| m.payload)
                .filter(|p| !p.is_empty())
                .collect()
        };

        self.messages.insert_message(&msg).await?;
        msg.set_receivers(channel.user_ids.iter().cloned());
        debug!(message_id = ?msg.message_id, channel = %channel.id, "Message stored");

        for filename in &msg.attachments {
            let unit = AttachmentToParse::new(
                filename.clone(),
                msg.user_id.clone(),
                msg.payload.clone(),
                prev_texts.clone(),
            );
            match BusMessage::json(&unit) {
                Ok(out) => self.publish(&self.topics.attachment, out).await,
                Err(e) => error!(filename = %filename, error = %e, "Failed to encode attachment"),
            }
        }

        Ok((msg, channel))
    }

    async fn resolve_channel(&self, msg: &Message) -> Result<Channel, ChatError> {
        if let Some(id) = msg.channel_id {
            let channel = self.channels.get_channel(id).await.map_err(|e| match e {
                StoreError::NotFound => ChatError::NotFound(format!("channel {id}")),
                other => other.into(),
            })?;
            if !channel.has_participant(&msg.user_id) {
                return Err(ChatError::Forbidden("not a member of this channel".into()));
            }
            return Ok(channel);
        }

        let peer = msg
            .peer_id
            .clone()
            .ok_or_else(|| ChatError::BadRequest("channel_id or peer_id is required".into()))?;
        let participants = Channel::canonical_participants([msg.user_id.clone(), peer])
            .map_err(|e| ChatError::BadRequest(e.to_string()))?;

        match self.channels.get_channel_by_participants(&participants).await {
            Ok(channel) => Ok(channel),
            Err(StoreError::NotFound) => {
                let channel = Channel::with_participants(participants.clone(), unix_now())
                    .map_err(|e| ChatError::BadRequest(e.to_string()))?;
                match self.channels.insert_channel(&channel).await {
                    Ok(()) => {
                        info!(channel = %channel.id, "Channel created");
                        Ok(channel)
                    }
                    // Lost a race with another sender creating the same channel.
                    Err(StoreError::AlreadyExists) => {
                        Ok(self.channels.get_channel_by_participants(&participants).await?)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn publish_delivery(&self, msg: &Message, channel: &Channel) {
        self.publish_keyed(&self.topics.delivery, msg, channel).await;
    }

    async fn publish_keyed(&self, topic: &str, msg: &Message, channel: &Channel) {
        match BusMessage::json(msg) {
            Ok(out) => self.publish(topic, out.with_key(channel.id.partition_key())).await,
            Err(e) => error!(topic, message_id = ?msg.message_id, error = %e, "Failed to encode message"),
        }
    }

    /// Steady-state publish failures are logged and the publish is dropped.
    async fn publish(&self, topic: &str, out: BusMessage) {
        let key = out.partition_key();
        if let Err(e) = self.publisher.publish(topic, out).await {
            error!(topic, key = %key, error = %e, "Publish failed, dropping");
        }
    }
}
