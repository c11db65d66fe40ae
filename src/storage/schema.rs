//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;
use tracing::debug;

pub const SCHEMA_VERSION: i64 = 1;

/// Run all pending migrations.
///
/// Timestamps are stored as integer milliseconds since the Unix epoch so that
/// range filters and ordering are plain integer comparisons.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY,
            message_type TEXT NOT NULL,
            transport TEXT NOT NULL,
            enqueued_at INTEGER NOT NULL,
            started_at INTEGER,
            finished_at INTEGER,
            status TEXT NOT NULL,
            error TEXT,
            attempt INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS message_tags (
            message_id INTEGER NOT NULL,
            tag TEXT NOT NULL,
            PRIMARY KEY (message_id, tag),
            FOREIGN KEY (message_id) REFERENCES messages(id)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_enqueued ON messages(enqueued_at, id);
        CREATE INDEX IF NOT EXISTS idx_messages_status ON messages(status);
        CREATE INDEX IF NOT EXISTS idx_messages_transport ON messages(transport);
        CREATE INDEX IF NOT EXISTS idx_messages_type ON messages(message_type);
        CREATE INDEX IF NOT EXISTS idx_message_tags_tag ON message_tags(tag);",
    )?;

    let applied = conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [SCHEMA_VERSION],
    )?;
    if applied > 0 {
        debug!(version = SCHEMA_VERSION, "applied schema migration");
    }

    Ok(())
}
