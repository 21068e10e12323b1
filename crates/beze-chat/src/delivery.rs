//! Outbound fan-out: bus messages to live sessions.

use std::sync::Arc;

use async_trait::async_trait;
use beze_bus::{BusError, BusMessage, HandlerError, NoPublishHandler, Router, Subscriber};
use beze_shared::Message;
use tracing::{debug, error, warn};

use crate::error::ChatError;
use crate::sessions::SessionRegistry;

/// Broadcasts every delivery-topic message to the live sessions of its
/// receivers. The frame written is the message with `receiver_ids` cleared.
pub struct DeliverySubscriber {
    registry: Arc<SessionRegistry>,
}

impl DeliverySubscriber {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Register one handler per delivery topic on `router`.
    pub fn register(
        router: &mut Router,
        topics: &[String],
        subscriber: Arc<dyn Subscriber>,
        registry: Arc<SessionRegistry>,
    ) -> Result<(), BusError> {
        for topic in topics {
            router.add_no_publisher_handler(
                format!("chat.delivery.{topic}"),
                topic.as_str(),
                subscriber.clone(),
                DeliverySubscriber::new(registry.clone()),
            )?;
        }
        Ok(())
    }
}

#[async_trait]
impl NoPublishHandler for DeliverySubscriber {
    async fn handle(&self, message: BusMessage) -> Result<(), HandlerError> {
        let msg: Message = match message.decode() {
            Ok(msg) => msg,
            Err(e) => {
                error!(
                    message_uuid = %message.uuid,
                    correlation_id = message.correlation_id().unwrap_or_default(),
                    error = %e,
                    "Dropping undecodable delivery payload"
                );
                return Ok(());
            }
        };

        if msg.receiver_ids.is_empty() {
            warn!(message_id = ?msg.message_id, "Delivery message without receivers, dropping");
            return Ok(());
        }

        let frame = serde_json::to_string(&msg.to_wire()).map_err(|e| HandlerError::Decode(e.to_string()))?;
        match self
            .registry
            .broadcast(frame, |user, _| msg.is_addressed_to(user))
            .await
        {
            Ok(report) => {
                debug!(
                    message_id = ?msg.message_id,
                    event = %msg.event,
                    matched = report.matched,
                    delivered = report.delivered,
                    failed = report.failed,
                    "Delivered"
                );
                Ok(())
            }
            Err(ChatError::ShuttingDown) => {
                debug!(message_id = ?msg.message_id, "Registry closed, broadcast refused");
                Ok(())
            }
            Err(e) => Err(HandlerError::failed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::SessionTags;
    use beze_shared::{ChannelId, Event, MessageId, SessionId, UserId};
    use std::time::Duration;

    fn registry() -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(Duration::from_millis(100), 8))
    }

    fn addressed(payload: &str, receivers: &[&str]) -> Message {
        let mut msg = Message::new(Event::Text, UserId::from("alice"), payload);
        msg.message_id = Some(MessageId::new());
        msg.channel_id = Some(ChannelId::new());
        msg.set_receivers(receivers.iter().map(|r| UserId::from(*r)));
        msg
    }

    #[tokio::test]
    async fn test_frame_reaches_receivers_without_receiver_ids() {
        let registry = registry();
        let mut bob = registry
            .register(SessionId::new(), SessionTags::for_user(UserId::from("bob")))
            .await
            .unwrap();
        let mut carol = registry
            .register(SessionId::new(), SessionTags::for_user(UserId::from("carol")))
            .await
            .unwrap();

        let handler = DeliverySubscriber::new(registry.clone());
        let msg = addressed("hi", &["alice", "bob"]);
        handler.handle(BusMessage::json(&msg).unwrap()).await.unwrap();

        let frame = bob.try_recv().unwrap();
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["payload"], "hi");
        assert!(json.get("receiver_ids").is_none());
        assert!(carol.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_dropped() {
        let registry = registry();
        let mut bob = registry
            .register(SessionId::new(), SessionTags::for_user(UserId::from("bob")))
            .await
            .unwrap();
        let handler = DeliverySubscriber::new(registry);

        handler.handle(BusMessage::new(&b"garbage"[..])).await.unwrap();
        assert!(bob.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_registry_acknowledges() {
        let registry = registry();
        registry.close().await;
        let handler = DeliverySubscriber::new(registry);
        let msg = addressed("hi", &["bob"]);
        assert!(handler.handle(BusMessage::json(&msg).unwrap()).await.is_ok());
    }

    #[test]
    fn test_one_handler_per_topic() {
        let mut router = Router::new(Default::default());
        let broker = beze_bus::MemoryBroker::new();
        DeliverySubscriber::register(
            &mut router,
            &["a".to_string(), "b".to_string()],
            Arc::new(broker),
            registry(),
        )
        .unwrap();
        assert_eq!(router.handler_names(), vec!["chat.delivery.a", "chat.delivery.b"]);
    }
}
