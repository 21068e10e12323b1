//! v001 -- Initial schema creation.
//!
//! Creates `channels`, `channel_members`, `messages` and `study_materials`.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Channels
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS channels (
    id               TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    user_ids         TEXT NOT NULL,               -- JSON array, sorted
    participants_key TEXT NOT NULL,               -- sorted ids joined with ','
    created          INTEGER NOT NULL,            -- unix seconds
    updated          INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_channels_participants
    ON channels(participants_key);

CREATE TABLE IF NOT EXISTS channel_members (
    channel_id TEXT NOT NULL,
    user_id    TEXT NOT NULL,

    PRIMARY KEY (channel_id, user_id),
    FOREIGN KEY (channel_id) REFERENCES channels(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_channel_members_user ON channel_members(user_id);

-- ----------------------------------------------------------------
-- Messages (delivery audience is never stored)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id               TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    channel_id       TEXT NOT NULL,
    user_id          TEXT NOT NULL,
    payload          TEXT NOT NULL DEFAULT '',
    structurized     TEXT NOT NULL DEFAULT '',
    voice            TEXT NOT NULL DEFAULT '',
    voice_duration   INTEGER NOT NULL DEFAULT 0,
    recognized_voice TEXT NOT NULL DEFAULT '',
    attachments      TEXT NOT NULL DEFAULT '[]',  -- JSON array of storage keys
    event            TEXT NOT NULL,
    created_at       INTEGER NOT NULL,
    updated_at       INTEGER NOT NULL,

    FOREIGN KEY (channel_id) REFERENCES channels(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_channel_created
    ON messages(channel_id, created_at DESC);

-- ----------------------------------------------------------------
-- Study materials
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS study_materials (
    id        TEXT PRIMARY KEY NOT NULL,
    name      TEXT NOT NULL,
    filename  TEXT NOT NULL,
    tags      TEXT NOT NULL DEFAULT '[]',         -- JSON array
    author_id TEXT NOT NULL,
    created   INTEGER NOT NULL,
    updated   INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_study_materials_author ON study_materials(author_id);
"#;

pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}
