//! CRUD operations for [`Channel`] records.

use beze_shared::{Channel, ChannelId, UserId};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{classify, Result};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new channel and its membership rows.
    ///
    /// The participant list is canonicalized first; a second channel with
    /// the same participant set fails with [`StoreError::AlreadyExists`].
    ///
    /// [`StoreError::AlreadyExists`]: crate::StoreError::AlreadyExists
    pub fn insert_channel(&mut self, channel: &Channel) -> Result<()> {
        let user_ids = Channel::canonical_participants(channel.user_ids.iter().cloned())?;
        let key = Channel::participants_key(&user_ids);

        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO channels (id, user_ids, participants_key, created, updated)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                channel.id.to_string(),
                serde_json::to_string(&user_ids)?,
                key,
                channel.created,
                channel.updated,
            ],
        )
        .map_err(classify)?;
        for user in &user_ids {
            tx.execute(
                "INSERT INTO channel_members (channel_id, user_id) VALUES (?1, ?2)",
                params![channel.id.to_string(), user.as_str()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_channel(&self, id: ChannelId) -> Result<Channel> {
        self.conn()
            .query_row(
                "SELECT id, user_ids, created, updated
                 FROM channels
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_channel,
            )
            .map_err(classify)
    }

    /// Look a channel up by an unordered participant set.
    pub fn get_channel_by_participants(&self, participants: &[UserId]) -> Result<Channel> {
        let sorted = Channel::canonical_participants(participants.iter().cloned())?;
        self.conn()
            .query_row(
                "SELECT id, user_ids, created, updated
                 FROM channels
                 WHERE participants_key = ?1",
                params![Channel::participants_key(&sorted)],
                row_to_channel,
            )
            .map_err(classify)
    }

    /// Channels the user participates in, most recently updated first.
    pub fn list_channels_for_user(&self, user: &UserId) -> Result<Vec<Channel>> {
        let mut stmt = self.conn().prepare(
            "SELECT c.id, c.user_ids, c.created, c.updated
             FROM channels c
             JOIN channel_members m ON m.channel_id = c.id
             WHERE m.user_id = ?1
             ORDER BY c.updated DESC",
        )?;

        let rows = stmt.query_map(params![user.as_str()], row_to_channel)?;

        let mut channels = Vec::new();
        for row in rows {
            channels.push(row?);
        }
        Ok(channels)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn conversion_error(
    column: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

pub(crate) fn parse_uuid(column: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| conversion_error(column, e))
}

fn row_to_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
    let id_str: String = row.get(0)?;
    let user_ids_json: String = row.get(1)?;

    let user_ids: Vec<UserId> =
        serde_json::from_str(&user_ids_json).map_err(|e| conversion_error(1, e))?;

    Ok(Channel {
        id: ChannelId(parse_uuid(0, &id_str)?),
        user_ids,
        created: row.get(2)?,
        updated: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreError;

    fn ids(raw: &[&str]) -> Vec<UserId> {
        raw.iter().map(|s| UserId::from(*s)).collect()
    }

    #[test]
    fn lookup_by_participants_is_order_insensitive() {
        let mut db = Database::open_in_memory().unwrap();
        let channel = Channel::with_participants(ids(&["bob", "alice"]), 100).unwrap();
        db.insert_channel(&channel).unwrap();

        let a = db.get_channel_by_participants(&ids(&["alice", "bob"])).unwrap();
        let b = db.get_channel_by_participants(&ids(&["bob", "alice"])).unwrap();
        assert_eq!(a, channel);
        assert_eq!(b, channel);
        assert_eq!(a.user_ids, ids(&["alice", "bob"]));
    }

    #[test]
    fn unsorted_channel_is_stored_sorted() {
        let mut db = Database::open_in_memory().unwrap();
        let channel = Channel {
            id: ChannelId::new(),
            user_ids: ids(&["zed", "amy", "zed"]),
            created: 1,
            updated: 1,
        };
        db.insert_channel(&channel).unwrap();
        let stored = db.get_channel(channel.id).unwrap();
        assert_eq!(stored.user_ids, ids(&["amy", "zed"]));
    }

    #[test]
    fn duplicate_participant_set_rejected() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_channel(&Channel::with_participants(ids(&["a", "b"]), 1).unwrap())
            .unwrap();
        let err = db
            .insert_channel(&Channel::with_participants(ids(&["b", "a"]), 2).unwrap())
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists));
    }

    #[test]
    fn missing_channel_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.get_channel(ChannelId::new()), Err(StoreError::NotFound)));
        assert!(matches!(
            db.get_channel_by_participants(&ids(&["x", "y"])),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn list_for_user_only_returns_memberships() {
        let mut db = Database::open_in_memory().unwrap();
        let ab = Channel::with_participants(ids(&["a", "b"]), 1).unwrap();
        let mut bc = Channel::with_participants(ids(&["b", "c"]), 2).unwrap();
        bc.updated = 5;
        db.insert_channel(&ab).unwrap();
        db.insert_channel(&bc).unwrap();

        let for_b = db.list_channels_for_user(&UserId::from("b")).unwrap();
        assert_eq!(for_b.iter().map(|c| c.id).collect::<Vec<_>>(), vec![bc.id, ab.id]);

        let for_a = db.list_channels_for_user(&UserId::from("a")).unwrap();
        assert_eq!(for_a.len(), 1);
        assert!(db.list_channels_for_user(&UserId::from("d")).unwrap().is_empty());
    }
}
