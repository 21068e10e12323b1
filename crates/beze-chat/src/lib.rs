//! # beze-chat
//!
//! Real-time chat delivery service.
//!
//! Inbound frames arrive over authenticated live connections and are
//! persisted and published on the bus by [`ChatService`]. Outbound, a
//! [`DeliverySubscriber`] per delivery topic fans every bus message out to
//! the live sessions of its receivers through the [`SessionRegistry`].
//! Enrichment results produced by other processes reach users the same way.

pub mod api;
pub mod auth;
pub mod config;
pub mod delivery;
pub mod error;
pub mod service;
pub mod sessions;
pub mod ws;

pub use api::{build_router, serve, AppState};
pub use auth::{HttpSessionValidator, SessionValidator};
pub use config::ChatConfig;
pub use delivery::DeliverySubscriber;
pub use error::ChatError;
pub use service::{ChatService, ChatTopics};
pub use sessions::{BroadcastReport, SessionRegistry, SessionTags};
