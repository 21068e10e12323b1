use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{BusError, HandlerError};
use crate::message::BusMessage;

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, message: BusMessage) -> Result<(), BusError>;

    /// Flush pending writes and refuse further publishes.
    async fn close(&self) -> Result<(), BusError>;
}

#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Start receiving every message published on `topic` from now on.
    /// The stream ends when the subscriber is closed.
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<BusMessage>, BusError>;

    async fn close(&self) -> Result<(), BusError>;
}

/// Handler whose output messages are published on the route's publish topic.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, message: BusMessage) -> Result<Vec<BusMessage>, HandlerError>;
}

/// Terminal handler that never produces follow-up messages.
#[async_trait]
pub trait NoPublishHandler: Send + Sync + 'static {
    async fn handle(&self, message: BusMessage) -> Result<(), HandlerError>;
}
