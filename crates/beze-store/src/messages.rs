//! CRUD operations for persisted [`Message`]s.
//!
//! `receiver_ids` has no column: rows always load with an empty audience.

use std::collections::BTreeSet;

use beze_shared::{ChannelId, Event, Message, MessageId, UserId};
use rusqlite::params;

use crate::channels::{conversion_error, parse_uuid};
use crate::database::Database;
use crate::error::{classify, Result, StoreError};

const MESSAGE_COLUMNS: &str = "id, channel_id, user_id, payload, structurized, voice, \
     voice_duration, recognized_voice, attachments, event, created_at, updated_at";

impl Database {
    /// Persist a message. Both `message_id` and `channel_id` must be set.
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        let (id, channel_id) = persisted_ids(message)?;
        self.conn()
            .execute(
                "INSERT INTO messages (id, channel_id, user_id, payload, structurized, voice,
                     voice_duration, recognized_voice, attachments, event, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    id.to_string(),
                    channel_id.to_string(),
                    message.user_id.as_str(),
                    message.payload,
                    message.structurized,
                    message.voice,
                    message.voice_duration,
                    message.recognized_voice,
                    serde_json::to_string(&message.attachments)?,
                    message.event.as_str(),
                    message.created_at,
                    message.updated_at,
                ],
            )
            .map_err(classify)?;
        Ok(())
    }

    /// Overwrite the mutable fields of an existing message.
    ///
    /// Identity, channel, sender, event and creation time are never changed.
    pub fn update_message(&self, message: &Message) -> Result<()> {
        let (id, _) = persisted_ids(message)?;
        let affected = self.conn().execute(
            "UPDATE messages
             SET payload = ?2, structurized = ?3, recognized_voice = ?4, attachments = ?5,
                 voice = ?6, voice_duration = ?7, updated_at = ?8
             WHERE id = ?1",
            params![
                id.to_string(),
                message.payload,
                message.structurized,
                message.recognized_voice,
                serde_json::to_string(&message.attachments)?,
                message.voice,
                message.voice_duration,
                message.updated_at,
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(classify)
    }

    /// Page through a channel's messages, newest first.
    pub fn list_messages_for_channel(
        &self,
        channel_id: ChannelId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE channel_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2 OFFSET ?3"
        ))?;

        let rows = stmt.query_map(params![channel_id.to_string(), limit, offset], row_to_message)?;
        collect(rows)
    }

    /// Messages of a channel created at or before `before_created_at`,
    /// newest first.
    pub fn previous_messages(
        &self,
        channel_id: ChannelId,
        before_created_at: i64,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE channel_id = ?1 AND created_at <= ?2
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3"
        ))?;

        let rows = stmt.query_map(
            params![channel_id.to_string(), before_created_at, limit],
            row_to_message,
        )?;
        collect(rows)
    }

    /// Messages of the same channel stored before `message_id`, newest first.
    ///
    /// Ordering is positional: rows sharing the target's `created_at` count
    /// as earlier only when they were inserted before it.
    pub fn previous_messages_before(&self, message_id: MessageId, limit: u32) -> Result<Vec<Message>> {
        let (channel_id, created_at, rowid): (String, i64, i64) = self
            .conn()
            .query_row(
                "SELECT channel_id, created_at, rowid FROM messages WHERE id = ?1",
                params![message_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(classify)?;

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE channel_id = ?1
               AND (created_at < ?2 OR (created_at = ?2 AND rowid < ?3))
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?4"
        ))?;

        let rows = stmt.query_map(params![channel_id, created_at, rowid, limit], row_to_message)?;
        collect(rows)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn persisted_ids(message: &Message) -> Result<(MessageId, ChannelId)> {
    match (message.message_id, message.channel_id) {
        (Some(id), Some(channel)) => Ok((id, channel)),
        (None, _) => Err(StoreError::Invalid("message has no id".into())),
        (_, None) => Err(StoreError::Invalid("message has no channel".into())),
    }
}

fn collect(
    rows: impl Iterator<Item = rusqlite::Result<Message>>,
) -> Result<Vec<Message>> {
    let mut messages = Vec::new();
    for row in rows {
        messages.push(row?);
    }
    Ok(messages)
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let channel_str: String = row.get(1)?;
    let user_id: String = row.get(2)?;
    let attachments_json: String = row.get(8)?;
    let event_str: String = row.get(9)?;

    let attachments: Vec<String> =
        serde_json::from_str(&attachments_json).map_err(|e| conversion_error(8, e))?;
    let event: Event = event_str.parse().map_err(|e| conversion_error(9, e))?;

    Ok(Message {
        message_id: Some(MessageId(parse_uuid(0, &id_str)?)),
        channel_id: Some(ChannelId(parse_uuid(1, &channel_str)?)),
        user_id: UserId(user_id),
        peer_id: None,
        receiver_ids: BTreeSet::new(),
        payload: row.get(3)?,
        structurized: row.get(4)?,
        voice: row.get(5)?,
        voice_duration: row.get(6)?,
        recognized_voice: row.get(7)?,
        attachments,
        event,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}
