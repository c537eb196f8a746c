//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `users`, `groups`, `group_members`, and
//! `group_messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (identity -> last-known connection id)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    email      TEXT PRIMARY KEY NOT NULL,
    socket     TEXT NOT NULL,                -- last-known connection id
    name       TEXT NOT NULL DEFAULT ''
);

-- ----------------------------------------------------------------
-- Groups
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS groups (
    id          TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    name        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    admin       TEXT NOT NULL,               -- admin email, immutable
    created_at  TEXT NOT NULL                -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Group members (order-preserving participant set)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS group_members (
    group_id TEXT NOT NULL,                  -- FK -> groups(id)
    position INTEGER NOT NULL,               -- insertion order
    email    TEXT NOT NULL,

    PRIMARY KEY (group_id, email),
    FOREIGN KEY (group_id) REFERENCES groups(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_group_members_email ON group_members(email);

-- ----------------------------------------------------------------
-- Group messages (append-only per-group log)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS group_messages (
    id        TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    group_id  TEXT NOT NULL,                 -- FK -> groups(id)
    sender    TEXT NOT NULL,                 -- sender email
    message   TEXT NOT NULL,
    timestamp TEXT NOT NULL,                 -- ISO-8601

    FOREIGN KEY (group_id) REFERENCES groups(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_group_messages_group_ts
    ON group_messages(group_id, timestamp DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
