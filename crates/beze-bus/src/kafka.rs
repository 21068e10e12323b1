//! Kafka backend.
//!
//! Payloads are the raw JSON bytes of the domain entity, the record key is
//! the message key (or its uuid) and metadata travels as record headers.
//! Every subscription joins a fresh consumer group so each subscriber sees
//! every message of the topic. Offsets are auto-committed on a fixed
//! interval, independently of handler completion: a crash after a commit
//! and before the handler finishes loses that message.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Headers, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::Message as _;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::BusError;
use crate::message::BusMessage;
use crate::traits::{Publisher, Subscriber};

/// Header carrying [`BusMessage::uuid`] across the broker.
const UUID_HEADER: &str = "message_uuid";

const SUBSCRIPTION_BUFFER: usize = 256;

pub struct KafkaPublisher {
    producer: FutureProducer,
    send_timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(brokers: &str, send_timeout: Duration) -> Result<Self, BusError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("acks", "all")
            .set("message.timeout.ms", "30000")
            .create()
            .map_err(|e| BusError::Publish {
                topic: "*".into(),
                reason: e.to_string(),
            })?;
        info!(brokers, "Kafka producer initialized");
        Ok(Self {
            producer,
            send_timeout,
        })
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&self, topic: &str, message: BusMessage) -> Result<(), BusError> {
        let key = message.partition_key();
        let uuid = message.uuid.to_string();

        let mut headers = OwnedHeaders::new().insert(Header {
            key: UUID_HEADER,
            value: Some(uuid.as_str()),
        });
        for (k, v) in &message.metadata {
            headers = headers.insert(Header {
                key: k.as_str(),
                value: Some(v.as_str()),
            });
        }

        let record = FutureRecord::to(topic)
            .key(&key)
            .payload(&message.payload[..])
            .headers(headers);

        match self
            .producer
            .send(record, Timeout::After(self.send_timeout))
            .await
        {
            Ok(delivery) => {
                debug!(topic, key = %key, ?delivery, "Published");
                Ok(())
            }
            Err((e, _)) => {
                error!(topic, key = %key, error = %e, "Kafka publish failed");
                Err(BusError::Publish {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn close(&self) -> Result<(), BusError> {
        let producer = self.producer.clone();
        let timeout = self.send_timeout;
        let flushed = tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
            .await
            .map_err(|e| BusError::Publish {
                topic: "*".into(),
                reason: e.to_string(),
            })?;
        if let Err(e) = flushed {
            warn!(error = %e, "Kafka producer flush incomplete");
        }
        Ok(())
    }
}

pub struct KafkaSubscriber {
    brokers: String,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl KafkaSubscriber {
    pub fn new(brokers: &str) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            brokers: brokers.to_string(),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn consumer(&self, group_id: &str) -> Result<StreamConsumer, rdkafka::error::KafkaError> {
        ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", "1000")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "30000")
            .create()
    }
}

#[async_trait]
impl Subscriber for KafkaSubscriber {
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<BusMessage>, BusError> {
        if *self.shutdown.borrow() {
            return Err(BusError::Closed);
        }

        let group_id = Uuid::new_v4().to_string();
        let subscribe_err = |e: rdkafka::error::KafkaError| BusError::Subscribe {
            topic: topic.to_string(),
            reason: e.to_string(),
        };
        let consumer = self.consumer(&group_id).map_err(subscribe_err)?;
        consumer.subscribe(&[topic]).map_err(subscribe_err)?;
        info!(topic, group_id = %group_id, "Kafka consumer subscribed");

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let mut shutdown = self.shutdown.subscribe();
        let topic = topic.to_string();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    received = consumer.recv() => match received {
                        Ok(record) => {
                            if tx.send(to_bus_message(&record)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(topic = %topic, error = %e, "Kafka receive error"),
                    },
                }
            }
            debug!(topic = %topic, "Kafka consumer stopped");
        });
        self.tasks.lock().await.push(task);

        Ok(rx)
    }

    async fn close(&self) -> Result<(), BusError> {
        let _ = self.shutdown.send(true);
        for task in self.tasks.lock().await.drain(..) {
            let _ = task.await;
        }
        Ok(())
    }
}

fn to_bus_message(record: &BorrowedMessage<'_>) -> BusMessage {
    let mut metadata = HashMap::new();
    let mut uuid = None;
    if let Some(headers) = record.headers() {
        for header in headers.iter() {
            let Some(value) = header.value else { continue };
            let value = String::from_utf8_lossy(value).into_owned();
            if header.key == UUID_HEADER {
                uuid = Uuid::parse_str(&value).ok();
            } else {
                metadata.insert(header.key.to_string(), value);
            }
        }
    }

    BusMessage {
        uuid: uuid.unwrap_or_else(Uuid::new_v4),
        key: record
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned()),
        payload: Bytes::copy_from_slice(record.payload().unwrap_or_default()),
        metadata,
    }
}
