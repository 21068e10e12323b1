//! Async repository traits consumed by the services, and their SQLite
//! implementation.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use beze_shared::{Channel, ChannelId, Message, MessageId, StudyMaterial, StudyMaterialId, UserId};
use tokio::sync::Mutex;

use crate::database::Database;
use crate::error::Result;

#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn insert_channel(&self, channel: &Channel) -> Result<()>;
    async fn get_channel(&self, id: ChannelId) -> Result<Channel>;
    /// The query set is canonicalized before comparison, so any order works.
    async fn get_channel_by_participants(&self, participants: &[UserId]) -> Result<Channel>;
    async fn list_channels_for_user(&self, user: &UserId) -> Result<Vec<Channel>>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert_message(&self, message: &Message) -> Result<()>;
    async fn update_message(&self, message: &Message) -> Result<()>;
    async fn get_message(&self, id: MessageId) -> Result<Message>;
    async fn list_messages_for_channel(
        &self,
        channel_id: ChannelId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>>;
    async fn previous_messages(
        &self,
        channel_id: ChannelId,
        before_created_at: i64,
        limit: u32,
    ) -> Result<Vec<Message>>;
    async fn previous_messages_before(&self, message_id: MessageId, limit: u32) -> Result<Vec<Message>>;
}

#[async_trait]
pub trait StudyMaterialRepository: Send + Sync {
    async fn insert_study_material(&self, material: &StudyMaterial) -> Result<()>;
    async fn get_study_material(&self, id: StudyMaterialId) -> Result<StudyMaterial>;
    async fn list_by_author(&self, author: &UserId) -> Result<Vec<StudyMaterial>>;
}

/// Shared handle over one [`Database`]. Cheap to clone.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Database::open_at(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }
}

#[async_trait]
impl ChannelRepository for SqliteStore {
    async fn insert_channel(&self, channel: &Channel) -> Result<()> {
        self.db.lock().await.insert_channel(channel)
    }

    async fn get_channel(&self, id: ChannelId) -> Result<Channel> {
        self.db.lock().await.get_channel(id)
    }

    async fn get_channel_by_participants(&self, participants: &[UserId]) -> Result<Channel> {
        self.db.lock().await.get_channel_by_participants(participants)
    }

    async fn list_channels_for_user(&self, user: &UserId) -> Result<Vec<Channel>> {
        self.db.lock().await.list_channels_for_user(user)
    }
}

#[async_trait]
impl MessageRepository for SqliteStore {
    async fn insert_message(&self, message: &Message) -> Result<()> {
        self.db.lock().await.insert_message(message)
    }

    async fn update_message(&self, message: &Message) -> Result<()> {
        self.db.lock().await.update_message(message)
    }

    async fn get_message(&self, id: MessageId) -> Result<Message> {
        self.db.lock().await.get_message(id)
    }

    async fn list_messages_for_channel(
        &self,
        channel_id: ChannelId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        self.db
            .lock()
            .await
            .list_messages_for_channel(channel_id, limit, offset)
    }

    async fn previous_messages(
        &self,
        channel_id: ChannelId,
        before_created_at: i64,
        limit: u32,
    ) -> Result<Vec<Message>> {
        self.db
            .lock()
            .await
            .previous_messages(channel_id, before_created_at, limit)
    }

    async fn previous_messages_before(&self, message_id: MessageId, limit: u32) -> Result<Vec<Message>> {
        self.db.lock().await.previous_messages_before(message_id, limit)
    }
}

#[async_trait]
impl StudyMaterialRepository for SqliteStore {
    async fn insert_study_material(&self, material: &StudyMaterial) -> Result<()> {
        self.db.lock().await.insert_study_material(material)
    }

    async fn get_study_material(&self, id: StudyMaterialId) -> Result<StudyMaterial> {
        self.db.lock().await.get_study_material(id)
    }

    async fn list_by_author(&self, author: &UserId) -> Result<Vec<StudyMaterial>> {
        self.db.lock().await.list_study_materials_by_author(author)
    }
}
