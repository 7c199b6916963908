use rusqlite::Connection;

use crate::error::Result;

/// Initialise the schedule schema in `conn`.
///
/// Creates the `scheduled_messages` table (idempotent) and an index on
/// `(status, post_at_utc)` so both the due-scan and the per-owner listing
/// stay efficient with thousands of pending messages.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS scheduled_messages (
            id           TEXT    NOT NULL PRIMARY KEY,
            owner_id     TEXT    NOT NULL,
            target_id    TEXT    NOT NULL,
            post_at_utc  TEXT    NOT NULL,   -- RFC 3339 UTC, second precision
            timezone_id  TEXT    NOT NULL,
            content      TEXT    NOT NULL,
            status       TEXT    NOT NULL DEFAULT 'pending',
            attempts     INTEGER NOT NULL DEFAULT 0,
            claim_token  TEXT,               -- set while status = 'claimed'
            created_at   TEXT    NOT NULL,
            updated_at   TEXT    NOT NULL
        ) STRICT;

        -- Due scan:    WHERE status = 'pending' AND post_at_utc <= ?
        -- Next wake:   MIN(post_at_utc)         WHERE status = 'pending'
        CREATE INDEX IF NOT EXISTS idx_messages_due
            ON scheduled_messages (status, post_at_utc);

        -- Owner listing: WHERE owner_id = ? AND status = 'pending'
        CREATE INDEX IF NOT EXISTS idx_messages_owner
            ON scheduled_messages (owner_id, post_at_utc);
        ",
    )?;
    Ok(())
}
