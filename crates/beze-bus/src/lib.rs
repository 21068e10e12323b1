//! # beze-bus
//!
//! Topic-based message bus decoupling the chat service from the enrichment
//! daemons. Producers publish [`BusMessage`]s through a [`Publisher`];
//! consumers are registered on a [`Router`], which owns one consumer task per
//! handler and wraps every delivery in the fixed middleware chain
//! (correlation id, timeout, panic recovery).
//!
//! Two backends are provided: [`MemoryBroker`] for a single process and for
//! tests, and a Kafka backend behind the `kafka` feature.

pub mod config;
pub mod error;
pub mod memory;
pub mod message;
pub mod middleware;
pub mod router;
pub mod traits;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use config::{Backend, BusConfig};
pub use error::{BusError, HandlerError};
pub use memory::MemoryBroker;
pub use message::{BusMessage, CORRELATION_ID_KEY};
pub use router::{Router, RouterConfig, RouterHandle};
pub use traits::{Handler, NoPublishHandler, Publisher, Subscriber};

use std::sync::Arc;

/// Publisher and subscriber halves of one broker connection.
pub type BusPair = (Arc<dyn Publisher>, Arc<dyn Subscriber>);

/// Connect to the backend selected by `config`.
///
/// Fails when the broker cannot be reached or when the Kafka backend is
/// requested from a build without the `kafka` feature.
pub fn connect(config: &BusConfig) -> Result<BusPair, BusError> {
    match config.backend {
        Backend::Memory => {
            tracing::warn!("Using the in-process bus; messages do not leave this process");
            let broker = MemoryBroker::new();
            Ok((Arc::new(broker.clone()), Arc::new(broker)))
        }
        #[cfg(feature = "kafka")]
        Backend::Kafka => {
            let publisher = kafka::KafkaPublisher::new(&config.brokers, config.publish_timeout)?;
            let subscriber = kafka::KafkaSubscriber::new(&config.brokers);
            Ok((Arc::new(publisher), Arc::new(subscriber)))
        }
        #[cfg(not(feature = "kafka"))]
        Backend::Kafka => Err(BusError::BackendUnavailable("kafka".into())),
    }
}
