//! Shared mocks for the scheduler unit tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use sendlater_core::platform::{NotificationApi, PostError, PostingApi};
use sendlater_core::types::{NewMessage, ScheduledMessage};
use sendlater_store::ScheduleStore;

pub fn mem_store() -> Arc<ScheduleStore> {
    Arc::new(ScheduleStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap())
}

/// Insert a record for `owner` and claim it, returning the claimed snapshot.
pub fn claimed_record(store: &ScheduleStore, owner: &str, content: &str) -> ScheduledMessage {
    store
        .insert(NewMessage {
            owner_id: owner.to_string(),
            target_id: "town-square".to_string(),
            post_at_utc: Utc::now() + Duration::minutes(1),
            timezone_id: "US/Eastern".to_string(),
            content: content.to_string(),
        })
        .unwrap();
    let mut claimed = store.claim_due(Utc::now() + Duration::minutes(5)).unwrap();
    assert_eq!(claimed.len(), 1);
    claimed.pop().unwrap()
}

enum PostBehavior {
    Succeed,
    TransientThenSucceed(u32),
    AlwaysTransient,
    NotFound,
    /// Transient failures for one specific target only; everything else
    /// succeeds immediately.
    TransientForTarget { target: String, times: u32 },
}

/// Posting API double that counts calls and fails on demand.
pub struct MockPosting {
    behavior: PostBehavior,
    calls: AtomicU32,
    target_calls: AtomicU32,
}

impl MockPosting {
    pub fn succeeding() -> Self {
        Self::with(PostBehavior::Succeed)
    }

    pub fn failing_transient_times(n: u32) -> Self {
        Self::with(PostBehavior::TransientThenSucceed(n))
    }

    pub fn always_transient() -> Self {
        Self::with(PostBehavior::AlwaysTransient)
    }

    pub fn not_found() -> Self {
        Self::with(PostBehavior::NotFound)
    }

    pub fn transient_for_target(target: &str, times: u32) -> Self {
        Self::with(PostBehavior::TransientForTarget {
            target: target.to_string(),
            times,
        })
    }

    fn with(behavior: PostBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicU32::new(0),
            target_calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PostingApi for MockPosting {
    async fn post(
        &self,
        target_id: &str,
        _author_id: &str,
        _content: &str,
    ) -> Result<(), PostError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.behavior {
            PostBehavior::Succeed => Ok(()),
            PostBehavior::TransientThenSucceed(n) if call <= *n => {
                Err(PostError::Transient("connection reset".into()))
            }
            PostBehavior::TransientThenSucceed(_) => Ok(()),
            PostBehavior::AlwaysTransient => Err(PostError::Transient("503".into())),
            PostBehavior::NotFound => Err(PostError::NotFound),
            PostBehavior::TransientForTarget { target, times } => {
                if target_id == target {
                    let seen = self.target_calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if seen <= *times {
                        return Err(PostError::Transient("connection reset".into()));
                    }
                }
                Ok(())
            }
        }
    }
}

/// Notification API double that records every notice.
#[derive(Default)]
pub struct MockNotifier {
    notices: Mutex<Vec<(String, String)>>,
}

impl MockNotifier {
    pub fn notices(&self) -> Vec<(String, String)> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationApi for MockNotifier {
    async fn notify(&self, user_id: &str, text: &str) -> Result<(), PostError> {
        self.notices
            .lock()
            .unwrap()
            .push((user_id.to_string(), text.to_string()));
        Ok(())
    }
}
