//! Command handler — orchestrates parser, resolver and store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::Notify;
use tracing::{debug, info};

use sendlater_core::platform::{TargetDirectory, UserDirectory};
use sendlater_core::types::{to_rfc3339_secs, NewMessage};
use sendlater_store::ScheduleStore;

use crate::error::{CommandError, Result};
use crate::parse::{parse, ParsedCommand};
use crate::resolve::resolve;

/// One pending message in a `list` reply.
#[derive(Debug, Clone)]
pub struct ListEntry {
    pub id: String,
    pub post_at_local: String,
    pub target_display: String,
    pub content: String,
}

/// Typed command outcome. Rendering to platform text is the gateway's job;
/// these carry the mandatory payload fields.
#[derive(Debug, Clone)]
pub enum CommandReply {
    Scheduled {
        id: String,
        post_at_local: String,
        timezone_id: String,
        target_display: String,
        content: String,
    },
    Listing(Vec<ListEntry>),
    Deleted {
        id: String,
    },
}

/// Request-path orchestrator for `schedule`, `list` and `delete`.
///
/// Holds its own store handle; the engine loop runs on a separate handle and
/// is coordinated purely through the store's conditional transitions plus the
/// shared wake [`Notify`].
pub struct CommandHandler {
    store: Arc<ScheduleStore>,
    users: Arc<dyn UserDirectory>,
    targets: Arc<dyn TargetDirectory>,
    wake: Arc<Notify>,
}

impl CommandHandler {
    pub fn new(
        store: Arc<ScheduleStore>,
        users: Arc<dyn UserDirectory>,
        targets: Arc<dyn TargetDirectory>,
        wake: Arc<Notify>,
    ) -> Self {
        Self {
            store,
            users,
            targets,
            wake,
        }
    }

    /// Handle one inbound command from `requester_id` issued in `channel_id`.
    pub async fn handle(
        &self,
        requester_id: &str,
        channel_id: &str,
        text: &str,
    ) -> Result<CommandReply> {
        match parse(text)? {
            ParsedCommand::Schedule {
                time_token,
                date_token,
                message,
            } => {
                self.schedule(
                    requester_id,
                    channel_id,
                    &time_token,
                    date_token.as_deref(),
                    message,
                )
                .await
            }
            ParsedCommand::List => self.list(requester_id).await,
            ParsedCommand::Delete { id } => self.delete(requester_id, &id),
        }
    }

    async fn schedule(
        &self,
        requester_id: &str,
        channel_id: &str,
        time_token: &str,
        date_token: Option<&str>,
        message: String,
    ) -> Result<CommandReply> {
        // The owner's timezone is load-bearing: without it nothing can be
        // resolved, so a directory failure here fails the whole request —
        // before any record exists.
        let tz = self
            .users
            .timezone(requester_id)
            .await
            .map_err(|e| CommandError::Internal(e.to_string()))?;

        let post_at = resolve(time_token, date_token, &tz, Utc::now())?;
        let target_display = self.describe(channel_id).await;

        let record = self.store.insert(NewMessage {
            owner_id: requester_id.to_string(),
            target_id: channel_id.to_string(),
            post_at_utc: post_at,
            timezone_id: tz.clone(),
            content: message,
        })?;
        // The engine may be asleep until a later instant; poke it so it
        // re-derives its next wake time from the store.
        self.wake.notify_one();

        info!(message_id = %record.id, owner = %requester_id, "schedule accepted");
        Ok(CommandReply::Scheduled {
            post_at_local: format_local(record.post_at_utc, &record.timezone_id),
            id: record.id,
            timezone_id: tz,
            target_display,
            content: record.content,
        })
    }

    async fn list(&self, requester_id: &str) -> Result<CommandReply> {
        let records = self.store.list_by_owner(requester_id)?;
        let mut entries = Vec::with_capacity(records.len());
        for rec in records {
            let target_display = self.describe(&rec.target_id).await;
            entries.push(ListEntry {
                post_at_local: format_local(rec.post_at_utc, &rec.timezone_id),
                id: rec.id,
                target_display,
                content: rec.content,
            });
        }
        Ok(CommandReply::Listing(entries))
    }

    fn delete(&self, requester_id: &str, id: &str) -> Result<CommandReply> {
        self.store.cancel(id, requester_id)?;
        // Wake the engine in case the cancelled record was its next due.
        self.wake.notify_one();
        Ok(CommandReply::Deleted { id: id.to_string() })
    }

    /// Display name for a target. Display-only, so a directory failure falls
    /// back to the raw ID instead of failing the request.
    async fn describe(&self, target_id: &str) -> String {
        match self.targets.describe(target_id).await {
            Ok(name) => name,
            Err(e) => {
                debug!(target = %target_id, error = %e, "target describe failed; using raw id");
                target_id.to_string()
            }
        }
    }
}

/// Render a UTC instant in the record's stored timezone for display.
/// Falls back to the RFC 3339 UTC form if the stored identifier no longer
/// parses (the zone database shifted underneath us).
pub fn format_local(post_at_utc: DateTime<Utc>, timezone_id: &str) -> String {
    match timezone_id.parse::<Tz>() {
        Ok(tz) => post_at_utc
            .with_timezone(&tz)
            .format("%Y-%m-%d %H:%M %Z")
            .to_string(),
        Err(_) => to_rfc3339_secs(post_at_utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use sendlater_core::platform::DirectoryError;

    struct FixedDirectory {
        tz: Option<String>,
    }

    #[async_trait]
    impl UserDirectory for FixedDirectory {
        async fn timezone(&self, _user_id: &str) -> std::result::Result<String, DirectoryError> {
            self.tz.clone().ok_or(DirectoryError::Transport(
                "directory unavailable".to_string(),
            ))
        }
    }

    #[async_trait]
    impl TargetDirectory for FixedDirectory {
        async fn describe(&self, target_id: &str) -> std::result::Result<String, DirectoryError> {
            Ok(format!("#{target_id}"))
        }
    }

    fn handler_with_tz(tz: Option<&str>) -> CommandHandler {
        let store =
            Arc::new(ScheduleStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap());
        let dir = Arc::new(FixedDirectory {
            tz: tz.map(String::from),
        });
        CommandHandler::new(store, dir.clone(), dir, Arc::new(Notify::new()))
    }

    #[tokio::test]
    async fn schedule_then_list_then_delete() {
        let handler = handler_with_tz(Some("US/Eastern"));

        let reply = handler
            .handle("alice", "town-square", "at 11:59pm message Night shift handover")
            .await
            .unwrap();
        let id = match reply {
            CommandReply::Scheduled {
                id,
                timezone_id,
                target_display,
                content,
                ..
            } => {
                assert_eq!(timezone_id, "US/Eastern");
                assert_eq!(target_display, "#town-square");
                assert_eq!(content, "Night shift handover");
                id
            }
            other => panic!("expected Scheduled, got {other:?}"),
        };

        match handler.handle("alice", "town-square", "list").await.unwrap() {
            CommandReply::Listing(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].id, id);
            }
            other => panic!("expected Listing, got {other:?}"),
        }

        match handler
            .handle("alice", "town-square", &format!("delete {id}"))
            .await
            .unwrap()
        {
            CommandReply::Deleted { id: deleted } => assert_eq!(deleted, id),
            other => panic!("expected Deleted, got {other:?}"),
        }

        match handler.handle("alice", "town-square", "list").await.unwrap() {
            CommandReply::Listing(entries) => assert!(entries.is_empty()),
            other => panic!("expected Listing, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_is_ownership_scoped() {
        let handler = handler_with_tz(Some("US/Eastern"));
        let id = match handler
            .handle("alice", "town-square", "at 11:59pm message mine")
            .await
            .unwrap()
        {
            CommandReply::Scheduled { id, .. } => id,
            other => panic!("expected Scheduled, got {other:?}"),
        };

        assert!(matches!(
            handler
                .handle("mallory", "town-square", &format!("delete {id}"))
                .await,
            Err(CommandError::Unauthorized { .. })
        ));
        assert!(matches!(
            handler
                .handle(
                    "alice",
                    "town-square",
                    "delete 00000000-0000-7000-8000-000000000000"
                )
                .await,
            Err(CommandError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn directory_failure_fails_cleanly() {
        let handler = handler_with_tz(None);
        let err = handler
            .handle("alice", "town-square", "at 10:00 message hi")
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Internal(_)));

        // No partial record was created.
        match handler.handle("alice", "town-square", "list").await.unwrap() {
            CommandReply::Listing(entries) => assert!(entries.is_empty()),
            other => panic!("expected Listing, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn parse_errors_pass_through() {
        let handler = handler_with_tz(Some("US/Eastern"));
        assert!(matches!(
            handler.handle("alice", "town-square", "at 10:00").await,
            Err(CommandError::MissingMessageKeyword)
        ));
    }

    #[test]
    fn format_local_renders_in_stored_zone() {
        let at = Utc.with_ymd_and_hms(2024, 7, 4, 13, 0, 0).unwrap();
        assert_eq!(format_local(at, "US/Eastern"), "2024-07-04 09:00 EDT");
        // Unknown zone falls back to UTC RFC 3339.
        assert_eq!(format_local(at, "Not/AZone"), "2024-07-04T13:00:00Z");
    }
}
