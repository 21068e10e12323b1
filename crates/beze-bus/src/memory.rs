//! In-process broker.
//!
//! Each subscription receives every message published on its topic after it
//! subscribed, the same fan-out the Kafka backend gets from giving every
//! subscription its own consumer group. A per-topic log of everything
//! published is kept for inspection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::debug;

use crate::error::BusError;
use crate::message::BusMessage;
use crate::traits::{Publisher, Subscriber};

/// Buffered messages per subscription before `publish` waits.
const SUBSCRIPTION_BUFFER: usize = 256;

#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    subscriptions: Mutex<HashMap<String, Vec<mpsc::Sender<BusMessage>>>>,
    log: Mutex<HashMap<String, Vec<BusMessage>>>,
    published: Notify,
    closed: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message published on `topic` so far, in publish order.
    pub async fn published(&self, topic: &str) -> Vec<BusMessage> {
        self.inner
            .log
            .lock()
            .await
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Wait until at least `count` messages were published on `topic`, or
    /// `limit` elapses, and return what was published.
    pub async fn wait_for_published(
        &self,
        topic: &str,
        count: usize,
        limit: Duration,
    ) -> Vec<BusMessage> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let notified = self.inner.published.notified();
            let seen = self.published(topic).await;
            if seen.len() >= count {
                return seen;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.published(topic).await;
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Publisher for MemoryBroker {
    async fn publish(&self, topic: &str, message: BusMessage) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        self.inner
            .log
            .lock()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(message.clone());

        let targets = self
            .inner
            .subscriptions
            .lock()
            .await
            .get(topic)
            .cloned()
            .unwrap_or_default();

        let mut dropped = 0usize;
        for tx in &targets {
            if tx.send(message.clone()).await.is_err() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            let mut subs = self.inner.subscriptions.lock().await;
            if let Some(list) = subs.get_mut(topic) {
                list.retain(|tx| !tx.is_closed());
            }
            debug!(topic, dropped, "Pruned closed subscriptions");
        }

        self.inner.published.notify_waiters();
        Ok(())
    }

    async fn close(&self) -> Result<(), BusError> {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.subscriptions.lock().await.clear();
        Ok(())
    }
}

#[async_trait]
impl Subscriber for MemoryBroker {
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<BusMessage>, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.inner
            .subscriptions
            .lock()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        debug!(topic, "Subscribed");
        Ok(rx)
    }

    async fn close(&self) -> Result<(), BusError> {
        Publisher::close(self).await
    }
}
