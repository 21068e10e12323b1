//! Handler router.
//!
//! Every registered handler gets its own subscription and a dedicated tokio
//! task that pulls messages one at a time, runs them through the middleware
//! chain and, for publishing handlers, forwards the produced messages. Tasks
//! are stopped through a shared watch channel; a message already being
//! handled is allowed to finish.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_HANDLER_TIMEOUT_SECS;
use crate::error::{BusError, HandlerError};
use crate::message::BusMessage;
use crate::middleware;
use crate::traits::{Handler, NoPublishHandler, Publisher, Subscriber};

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Hard processing budget for a single message.
    pub handler_timeout: Duration,
    /// How long `close()` waits for a consumer task before aborting it.
    pub close_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_secs(DEFAULT_HANDLER_TIMEOUT_SECS),
            close_timeout: Duration::from_secs(30),
        }
    }
}

enum Route {
    Publishing {
        handler: Arc<dyn Handler>,
        publish_topic: String,
        publisher: Arc<dyn Publisher>,
    },
    Terminal(Arc<dyn NoPublishHandler>),
}

struct RouteSpec {
    name: String,
    subscribe_topic: String,
    subscriber: Arc<dyn Subscriber>,
    route: Route,
}

pub struct Router {
    config: RouterConfig,
    routes: Vec<RouteSpec>,
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            routes: Vec::new(),
        }
    }

    /// Register a handler whose outputs are published on `publish_topic`.
    pub fn add_handler(
        &mut self,
        name: impl Into<String>,
        subscribe_topic: impl Into<String>,
        subscriber: Arc<dyn Subscriber>,
        publish_topic: impl Into<String>,
        publisher: Arc<dyn Publisher>,
        handler: impl Handler,
    ) -> Result<&mut Self, BusError> {
        let route = Route::Publishing {
            handler: Arc::new(handler),
            publish_topic: publish_topic.into(),
            publisher,
        };
        self.push(name.into(), subscribe_topic.into(), subscriber, route)
    }

    /// Register a terminal handler.
    pub fn add_no_publisher_handler(
        &mut self,
        name: impl Into<String>,
        subscribe_topic: impl Into<String>,
        subscriber: Arc<dyn Subscriber>,
        handler: impl NoPublishHandler,
    ) -> Result<&mut Self, BusError> {
        let route = Route::Terminal(Arc::new(handler));
        self.push(name.into(), subscribe_topic.into(), subscriber, route)
    }

    fn push(
        &mut self,
        name: String,
        subscribe_topic: String,
        subscriber: Arc<dyn Subscriber>,
        route: Route,
    ) -> Result<&mut Self, BusError> {
        if self.routes.iter().any(|r| r.name == name) {
            return Err(BusError::DuplicateHandler(name));
        }
        self.routes.push(RouteSpec {
            name,
            subscribe_topic,
            subscriber,
            route,
        });
        Ok(self)
    }

    pub fn handler_names(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.name.as_str()).collect()
    }

    /// Subscribe every handler and spawn its consumer task.
    ///
    /// Any subscribe failure aborts startup: tasks already spawned are
    /// stopped and the error is returned.
    pub async fn start(self) -> Result<RouterHandle, BusError> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handle = RouterHandle {
            shutdown_tx,
            tasks: Vec::with_capacity(self.routes.len()),
            close_timeout: self.config.close_timeout,
        };

        let mut topics = HashSet::new();
        for spec in self.routes {
            let rx = match spec.subscriber.subscribe(&spec.subscribe_topic).await {
                Ok(rx) => rx,
                Err(e) => {
                    error!(handler = %spec.name, topic = %spec.subscribe_topic, error = %e, "Subscribe failed");
                    handle.close().await;
                    return Err(e);
                }
            };
            topics.insert(spec.subscribe_topic.clone());

            let consumer = Consumer {
                name: spec.name.clone(),
                topic: spec.subscribe_topic,
                route: spec.route,
                handler_timeout: self.config.handler_timeout,
            };
            let task = tokio::spawn(consumer.run(rx, shutdown_rx.clone()));
            handle.tasks.push((spec.name, task));
        }

        info!(handlers = handle.tasks.len(), topics = topics.len(), "Bus router started");
        Ok(handle)
    }
}

/// Running router. Dropping it without `close()` leaves the tasks running
/// until their subscriptions end.
pub struct RouterHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<(String, JoinHandle<()>)>,
    close_timeout: Duration,
}

impl RouterHandle {
    pub fn handler_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stop intake, let in-flight messages finish, and join every task.
    pub async fn close(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for (name, task) in self.tasks.drain(..) {
            let abort = task.abort_handle();
            match tokio::time::timeout(self.close_timeout, task).await {
                Ok(Ok(())) => debug!(handler = %name, "Consumer stopped"),
                Ok(Err(e)) => warn!(handler = %name, error = %e, "Consumer task failed"),
                Err(_) => {
                    warn!(handler = %name, "Consumer did not drain in time, aborting");
                    abort.abort();
                }
            }
        }
        info!("Bus router closed");
    }
}

struct Consumer {
    name: String,
    topic: String,
    route: Route,
    handler_timeout: Duration,
}

impl Consumer {
    async fn run(self, mut rx: mpsc::Receiver<BusMessage>, mut shutdown: watch::Receiver<bool>) {
        debug!(handler = %self.name, topic = %self.topic, "Consumer running");
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                next = rx.recv() => match next {
                    Some(message) => self.process(message).await,
                    None => {
                        debug!(handler = %self.name, "Subscription ended");
                        break;
                    }
                },
            }
        }
    }

    async fn process(&self, mut message: BusMessage) {
        let correlation_id = middleware::ensure_correlation_id(&mut message);
        let uuid = message.uuid;

        match &self.route {
            Route::Terminal(handler) => {
                let result = middleware::timeout(
                    self.handler_timeout,
                    middleware::recoverer(handler.handle(message)),
                )
                .await;
                if let Err(e) = result {
                    self.log_failure(&correlation_id, uuid, &e);
                }
            }
            Route::Publishing {
                handler,
                publish_topic,
                publisher,
            } => {
                let result = middleware::timeout(
                    self.handler_timeout,
                    middleware::recoverer(handler.handle(message)),
                )
                .await;
                let mut produced = match result {
                    Ok(produced) => produced,
                    Err(e) => {
                        self.log_failure(&correlation_id, uuid, &e);
                        return;
                    }
                };
                middleware::stamp_correlation_id(&mut produced, &correlation_id);
                for out in produced {
                    if let Err(e) = publisher.publish(publish_topic, out).await {
                        error!(
                            handler = %self.name,
                            topic = %publish_topic,
                            correlation_id = %correlation_id,
                            error = %e,
                            "Dropping produced message"
                        );
                    }
                }
            }
        }
    }

    fn log_failure(&self, correlation_id: &str, uuid: uuid::Uuid, err: &HandlerError) {
        error!(
            handler = %self.name,
            topic = %self.topic,
            correlation_id = %correlation_id,
            message_uuid = %uuid,
            error = %err,
            "Handler failed"
        );
    }
}
