//! # beze-store
//!
//! Persistence adapters for channels, messages and study materials.
//!
//! [`Database`] is a synchronous handle over a `rusqlite::Connection` with
//! typed CRUD helpers; [`SqliteStore`] shares one behind an async mutex and
//! implements the narrow repository traits the services depend on.

pub mod channels;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod repository;
pub mod study_materials;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use repository::{ChannelRepository, MessageRepository, SqliteStore, StudyMaterialRepository};
