//! The enrichment daemon pattern.
//!
//! A daemon subscribes one topic, decodes each payload into the enricher's
//! input type, runs the enricher once, and either publishes a derived chat
//! message or stops after a persistence write. Failures never reach the bus
//! as errors: they go through the daemon's [`FailurePolicy`].

use std::sync::Arc;

use async_trait::async_trait;
use beze_bus::{
    BusMessage, Handler, HandlerError, NoPublishHandler, Publisher, Router, RouterConfig, Subscriber,
};
use beze_shared::{Message, StudyMaterial};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::error::EnrichmentError;

/// Result of enriching one unit of work.
#[derive(Debug)]
pub enum Outcome {
    /// Publish this message on the daemon's output topic.
    Publish(Message),
    /// A derived record was stored; nothing to publish.
    Persisted(StudyMaterial),
    /// The collaborator answered but there is nothing to derive.
    Skipped,
}

#[async_trait]
pub trait Enricher: Send + Sync + 'static {
    type Input: DeserializeOwned + Send;

    fn name(&self) -> &'static str;

    async fn enrich(&self, input: Self::Input) -> Result<Outcome, EnrichmentError>;
}

/// What a daemon does with a unit of work it could not enrich.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log the failure and acknowledge the message. Nothing is retried or
    /// re-queued, so a malformed payload cannot loop.
    #[default]
    LogAndDrop,
}

impl FailurePolicy {
    fn on_decode_failure(
        &self,
        daemon: &'static str,
        message: &BusMessage,
        err: &serde_json::Error,
    ) -> Result<Vec<BusMessage>, HandlerError> {
        match self {
            FailurePolicy::LogAndDrop => {
                error!(
                    daemon,
                    message_uuid = %message.uuid,
                    correlation_id = message.correlation_id().unwrap_or_default(),
                    error = %err,
                    "Dropping undecodable payload"
                );
                Ok(Vec::new())
            }
        }
    }

    fn on_enrichment_failure(
        &self,
        daemon: &'static str,
        message: &BusMessage,
        err: &EnrichmentError,
    ) -> Result<Vec<BusMessage>, HandlerError> {
        match self {
            FailurePolicy::LogAndDrop => {
                error!(
                    daemon,
                    message_uuid = %message.uuid,
                    correlation_id = message.correlation_id().unwrap_or_default(),
                    collaborator = err.is_collaborator_failure(),
                    error = %err,
                    "Enrichment failed, dropping"
                );
                Ok(Vec::new())
            }
        }
    }
}

/// Bus handler running one [`Enricher`].
pub struct EnrichmentDaemon<E> {
    enricher: E,
    policy: FailurePolicy,
}

impl<E: Enricher> EnrichmentDaemon<E> {
    pub fn new(enricher: E, policy: FailurePolicy) -> Self {
        Self { enricher, policy }
    }

    pub fn name(&self) -> &'static str {
        self.enricher.name()
    }

    /// Adapt into a handler whose outcomes are never published.
    pub fn into_terminal(self) -> impl NoPublishHandler {
        Terminal(self)
    }
}

#[async_trait]
impl<E: Enricher> Handler for EnrichmentDaemon<E> {
    async fn handle(&self, message: BusMessage) -> Result<Vec<BusMessage>, HandlerError> {
        let name = self.enricher.name();
        let input: E::Input = match message.decode() {
            Ok(input) => input,
            Err(e) => return self.policy.on_decode_failure(name, &message, &e),
        };

        match self.enricher.enrich(input).await {
            Ok(Outcome::Publish(derived)) => {
                let mut out = BusMessage::json(&derived)?;
                if let Some(channel) = derived.channel_id {
                    out = out.with_key(channel.partition_key());
                }
                debug!(daemon = name, message_id = ?derived.message_id, "Publishing derived message");
                Ok(vec![out])
            }
            Ok(Outcome::Persisted(material)) => {
                info!(daemon = name, study_material = %material.id, "Stored derived record");
                Ok(Vec::new())
            }
            Ok(Outcome::Skipped) => {
                debug!(daemon = name, "Nothing to derive");
                Ok(Vec::new())
            }
            Err(e) => self.policy.on_enrichment_failure(name, &message, &e),
        }
    }
}

/// Adapter registering a daemon whose outcomes are never published.
struct Terminal<E>(EnrichmentDaemon<E>);

#[async_trait]
impl<E: Enricher> NoPublishHandler for Terminal<E> {
    async fn handle(&self, message: BusMessage) -> Result<(), HandlerError> {
        let produced = Handler::handle(&self.0, message).await?;
        if !produced.is_empty() {
            warn!(daemon = self.0.name(), count = produced.len(), "Terminal daemon produced messages, discarding");
        }
        Ok(())
    }
}

/// Start a router with a single daemon handler, run until Ctrl+C, then
/// drain the router before closing the broker connections.
///
/// With `output_topic` set, derived messages are published there; without
/// it the daemon is terminal.
pub async fn run_daemon<E: Enricher>(
    daemon: EnrichmentDaemon<E>,
    input_topic: &str,
    output_topic: Option<&str>,
    router_config: RouterConfig,
    publisher: Arc<dyn Publisher>,
    subscriber: Arc<dyn Subscriber>,
) -> anyhow::Result<()> {
    let name = daemon.name();
    let mut router = Router::new(router_config);
    match output_topic {
        Some(output_topic) => {
            router.add_handler(
                name,
                input_topic,
                subscriber.clone(),
                output_topic,
                publisher.clone(),
                daemon,
            )?;
        }
        None => {
            router.add_no_publisher_handler(name, input_topic, subscriber.clone(), daemon.into_terminal())?;
        }
    }
    let mut handle = router.start().await?;
    info!(daemon = name, input_topic, output_topic = ?output_topic, "Daemon running");

    tokio::signal::ctrl_c().await?;
    info!(daemon = name, "Received Ctrl+C, shutting down");

    handle.close().await;
    subscriber.close().await?;
    publisher.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use beze_shared::{ChannelId, Event, UserId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echoes the decoded message back, or fails when the payload says so.
    struct Mirror {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Enricher for Mirror {
        type Input = Message;

        fn name(&self) -> &'static str {
            "mirror"
        }

        async fn enrich(&self, input: Message) -> Result<Outcome, EnrichmentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match input.payload.as_str() {
                "fail" => Err(EnrichmentError::Unavailable {
                    service: "mirror",
                    reason: "down".into(),
                }),
                "skip" => Ok(Outcome::Skipped),
                _ => Ok(Outcome::Publish(input)),
            }
        }
    }

    fn daemon() -> (EnrichmentDaemon<Mirror>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mirror = Mirror {
            calls: calls.clone(),
        };
        (EnrichmentDaemon::new(mirror, FailurePolicy::LogAndDrop), calls)
    }

    fn text(payload: &str) -> Message {
        let mut msg = Message::new(Event::Text, UserId::from("a"), payload);
        msg.channel_id = Some(ChannelId::new());
        msg
    }

    #[tokio::test]
    async fn malformed_payload_is_acknowledged_without_side_effects() {
        let (daemon, calls) = daemon();
        let bad = BusMessage::new(&b"{not json"[..]);

        for _ in 0..2 {
            let out = Handler::handle(&daemon, bad.clone()).await.unwrap();
            assert!(out.is_empty());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn collaborator_failure_is_dropped() {
        let (daemon, calls) = daemon();
        let msg = BusMessage::json(&text("fail")).unwrap();
        assert!(Handler::handle(&daemon, msg).await.unwrap().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn derived_message_keyed_by_channel() {
        let (daemon, _) = daemon();
        let original = text("hello");
        let channel = original.channel_id.unwrap();

        let out = Handler::handle(&daemon, BusMessage::json(&original).unwrap()).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].key.as_deref(), Some(channel.partition_key().as_str()));
        let decoded: Message = out[0].decode().unwrap();
        assert_eq!(decoded.payload, "hello");
    }

    #[tokio::test]
    async fn terminal_adapter_discards_output() {
        let (daemon, calls) = daemon();
        let terminal = Terminal(daemon);
        NoPublishHandler::handle(&terminal, BusMessage::json(&text("hello")).unwrap())
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn skipped_publishes_nothing() {
        let (daemon, _) = daemon();
        let out = Handler::handle(&daemon, BusMessage::json(&text("skip")).unwrap())
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
