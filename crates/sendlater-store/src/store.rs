use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info, warn};
use uuid::Uuid;

use sendlater_core::types::{to_rfc3339_secs, MessageStatus, NewMessage, ScheduledMessage};

use crate::db::init_db;
use crate::error::{Result, StoreError};

const COLUMNS: &str = "id, owner_id, target_id, post_at_utc, timezone_id, content, \
                       status, attempts, created_at, updated_at";

/// Thread-safe handle over the `scheduled_messages` table.
///
/// Wraps one SQLite connection in a `Mutex`; subsystems that need concurrent
/// access (command handlers vs. the engine loop) each open their own handle
/// on the same database file. State transitions are encoded as conditional
/// UPDATEs, so racing handles still serialize through SQLite: a `cancel`
/// racing a `claim_due` for the same row has exactly one winner.
pub struct ScheduleStore {
    db: Mutex<Connection>,
}

impl ScheduleStore {
    /// Wrap a connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Persist a new message with status Pending and return the full record.
    ///
    /// A single INSERT — there is no window in which a partial record is
    /// visible. Rejects empty content and non-future instants.
    pub fn insert(&self, new: NewMessage) -> Result<ScheduledMessage> {
        if new.content.trim().is_empty() {
            return Err(StoreError::InvalidMessage("content is empty".into()));
        }
        let now = Utc::now();
        if new.post_at_utc <= now {
            return Err(StoreError::InvalidMessage(format!(
                "post_at_utc {} is not in the future",
                to_rfc3339_secs(new.post_at_utc)
            )));
        }

        let id = Uuid::now_v7().to_string();
        let now_str = to_rfc3339_secs(now);
        let post_at = to_rfc3339_secs(new.post_at_utc);

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO scheduled_messages
             (id, owner_id, target_id, post_at_utc, timezone_id, content,
              status, attempts, claim_token, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,'pending',0,NULL,?7,?7)",
            rusqlite::params![
                id,
                new.owner_id,
                new.target_id,
                post_at,
                new.timezone_id,
                new.content,
                now_str
            ],
        )?;
        info!(message_id = %id, owner = %new.owner_id, post_at = %post_at, "message scheduled");

        Ok(ScheduledMessage {
            id,
            owner_id: new.owner_id,
            target_id: new.target_id,
            post_at_utc: new.post_at_utc,
            timezone_id: new.timezone_id,
            content: new.content,
            status: MessageStatus::Pending,
            attempts: 0,
            created_at: now_str.clone(),
            updated_at: now_str,
        })
    }

    /// Fetch a message by ID, `None` if it does not exist.
    pub fn get(&self, id: &str) -> Result<Option<ScheduledMessage>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {COLUMNS} FROM scheduled_messages WHERE id = ?1"
        ))?;
        let mut rows: Vec<ScheduledMessage> = stmt
            .query_map([id], row_to_tuple)?
            .filter_map(|r| r.ok().and_then(decode_row))
            .collect();
        Ok(rows.pop())
    }

    /// Pending messages belonging to `owner_id`, soonest first.
    ///
    /// The ascending order on `post_at_utc` is a user-facing contract.
    pub fn list_by_owner(&self, owner_id: &str) -> Result<Vec<ScheduledMessage>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {COLUMNS} FROM scheduled_messages
             WHERE owner_id = ?1 AND status = 'pending'
             ORDER BY post_at_utc ASC"
        ))?;
        let messages = stmt
            .query_map([owner_id], row_to_tuple)?
            .filter_map(|r| r.ok().and_then(decode_row))
            .collect();
        Ok(messages)
    }

    /// Cancel a pending message, iff `requester_id` owns it.
    ///
    /// The conditional UPDATE is the cancel/claim tie-break: once the engine
    /// has claimed the row, cancellation returns `Conflict` and the message
    /// is delivered or fails normally.
    pub fn cancel(&self, id: &str, requester_id: &str) -> Result<()> {
        let now_str = to_rfc3339_secs(Utc::now());
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE scheduled_messages
             SET status = 'cancelled', claim_token = NULL, updated_at = ?3
             WHERE id = ?1 AND owner_id = ?2 AND status = 'pending'",
            rusqlite::params![id, requester_id, now_str],
        )?;
        if n == 1 {
            info!(message_id = %id, "message cancelled");
            return Ok(());
        }

        // Nothing updated — distinguish why. A non-owner learns only that the
        // record exists, never its contents.
        let row: Option<(String, String)> = match db.query_row(
            "SELECT owner_id, status FROM scheduled_messages WHERE id = ?1",
            [id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        ) {
            Ok(r) => Some(r),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(StoreError::Database(e)),
        };
        match row {
            None => Err(StoreError::NotFound { id: id.to_string() }),
            Some((owner, _)) if owner != requester_id => Err(StoreError::Unauthorized {
                id: id.to_string(),
            }),
            Some((_, status)) => Err(StoreError::Conflict {
                id: id.to_string(),
                status,
            }),
        }
    }

    /// Atomically claim every pending message due at `now` and return the
    /// claimed records.
    ///
    /// Each call stamps a fresh claim token and flips matching rows
    /// pending→claimed in one UPDATE, then selects by token. Two concurrent
    /// claimers can never receive the same record — the linchpin of
    /// exactly-once dispatch.
    pub fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledMessage>> {
        let token = Uuid::now_v7().to_string();
        let now_str = to_rfc3339_secs(now);
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE scheduled_messages
             SET status = 'claimed', claim_token = ?1, updated_at = ?2
             WHERE status = 'pending' AND post_at_utc <= ?2",
            rusqlite::params![token, now_str],
        )?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = db.prepare(&format!(
            "SELECT {COLUMNS} FROM scheduled_messages
             WHERE claim_token = ?1
             ORDER BY post_at_utc ASC"
        ))?;
        let claimed: Vec<ScheduledMessage> = stmt
            .query_map([&token], row_to_tuple)?
            .filter_map(|r| r.ok().and_then(decode_row))
            .collect();
        debug!(count = claimed.len(), "messages claimed for delivery");
        Ok(claimed)
    }

    /// Terminal transition: claimed → delivered.
    pub fn mark_delivered(&self, id: &str) -> Result<()> {
        self.finish_claim(id, "delivered")
    }

    /// Terminal transition: claimed → failed.
    pub fn mark_failed(&self, id: &str) -> Result<()> {
        self.finish_claim(id, "failed")
    }

    /// Record one delivery attempt against an in-flight claim.
    pub fn record_attempt(&self, id: &str) -> Result<()> {
        let now_str = to_rfc3339_secs(Utc::now());
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE scheduled_messages
             SET attempts = attempts + 1, updated_at = ?2
             WHERE id = ?1 AND status = 'claimed'",
            rusqlite::params![id, now_str],
        )?;
        Ok(())
    }

    /// Physically delete a record. Used once a record is terminal: delivered
    /// immediately, failed after the owner notification has been attempted.
    pub fn remove(&self, id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute("DELETE FROM scheduled_messages WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    /// Crash recovery: return any row stuck in 'claimed' to 'pending'.
    ///
    /// Called once at engine startup, before the first due sweep. A claim
    /// only outlives its delivery task when the process died mid-flight.
    pub fn release_claims(&self) -> Result<usize> {
        let now_str = to_rfc3339_secs(Utc::now());
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE scheduled_messages
             SET status = 'pending', claim_token = NULL, updated_at = ?1
             WHERE status = 'claimed'",
            [&now_str],
        )?;
        if n > 0 {
            warn!(count = n, "released stale claims from previous run");
        }
        Ok(n)
    }

    /// Sweep rows whose terminal state makes them removable
    /// (delivered and cancelled; failed rows wait for their notification).
    pub fn purge_terminal(&self) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "DELETE FROM scheduled_messages WHERE status IN ('delivered','cancelled')",
            [],
        )?;
        if n > 0 {
            debug!(count = n, "purged terminal records");
        }
        Ok(n)
    }

    /// Earliest due instant among pending messages.
    ///
    /// Derived from the table on every call — never cached in process memory,
    /// so the engine's wake time survives restarts for free.
    pub fn next_due_at(&self) -> Result<Option<DateTime<Utc>>> {
        let db = self.db.lock().unwrap();
        let min: Option<String> = db.query_row(
            "SELECT MIN(post_at_utc) FROM scheduled_messages WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        Ok(min
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    fn finish_claim(&self, id: &str, status: &str) -> Result<()> {
        let now_str = to_rfc3339_secs(Utc::now());
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE scheduled_messages
             SET status = ?2, claim_token = NULL, updated_at = ?3
             WHERE id = ?1 AND status = 'claimed'",
            rusqlite::params![id, status, now_str],
        )?;
        if n == 1 {
            return Ok(());
        }
        let exists: bool = db
            .query_row(
                "SELECT 1 FROM scheduled_messages WHERE id = ?1",
                [id],
                |_| Ok(()),
            )
            .map(|_| true)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(false),
                other => Err(StoreError::Database(other)),
            })?;
        if exists {
            Err(StoreError::Conflict {
                id: id.to_string(),
                status: "not claimed".into(),
            })
        } else {
            Err(StoreError::NotFound { id: id.to_string() })
        }
    }
}

type Row = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    u32,
    String,
    String,
);

fn row_to_tuple(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    Ok((
        row.get(0)?, // id
        row.get(1)?, // owner_id
        row.get(2)?, // target_id
        row.get(3)?, // post_at_utc
        row.get(4)?, // timezone_id
        row.get(5)?, // content
        row.get(6)?, // status
        row.get(7)?, // attempts
        row.get(8)?, // created_at
        row.get(9)?, // updated_at
    ))
}

fn decode_row(row: Row) -> Option<ScheduledMessage> {
    let (id, owner_id, target_id, post_at, timezone_id, content, status, attempts, created_at, updated_at) =
        row;
    let post_at_utc = DateTime::parse_from_rfc3339(&post_at)
        .ok()?
        .with_timezone(&Utc);
    let status: MessageStatus = status.parse().ok()?;
    Some(ScheduledMessage {
        id,
        owner_id,
        target_id,
        post_at_utc,
        timezone_id,
        content,
        status,
        attempts,
        created_at,
        updated_at,
    })
}
