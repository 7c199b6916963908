//! Delivery of claimed records through the posting API.

use std::sync::Arc;

use chrono_tz::Tz;
use tracing::{error, info, warn};

use sendlater_core::platform::{NotificationApi, PostError, PostingApi};
use sendlater_core::types::{to_rfc3339_secs, ScheduledMessage};
use sendlater_store::ScheduleStore;

use crate::retry::RetryPolicy;

/// Posts claimed records, applying the retry policy, and settles their
/// terminal state in the store.
///
/// One `deliver` call handles one record start to finish; the engine spawns
/// each call in its own task.
pub struct Delivery {
    store: Arc<ScheduleStore>,
    posting: Arc<dyn PostingApi>,
    notifier: Arc<dyn NotificationApi>,
    policy: RetryPolicy,
}

impl Delivery {
    pub fn new(
        store: Arc<ScheduleStore>,
        posting: Arc<dyn PostingApi>,
        notifier: Arc<dyn NotificationApi>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            posting,
            notifier,
            policy,
        }
    }

    /// Deliver one claimed record to its target.
    ///
    /// Transient failures retry with backoff up to the policy bound;
    /// permanent failures (target gone, forbidden) fail immediately. Either
    /// way the record ends terminal: delivered rows are removed at once,
    /// failed rows after the owner notification has been attempted.
    pub async fn deliver(&self, record: ScheduledMessage) {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if let Err(e) = self.store.record_attempt(&record.id) {
                warn!(message_id = %record.id, error = %e, "failed to record attempt");
            }

            match self
                .posting
                .post(&record.target_id, &record.owner_id, &record.content)
                .await
            {
                Ok(()) => {
                    info!(message_id = %record.id, target = %record.target_id, attempt, "message delivered");
                    self.settle_delivered(&record.id);
                    return;
                }
                Err(e) if e.is_transient() && self.policy.allows_retry(attempt) => {
                    let wait = self.policy.delay_after(attempt);
                    warn!(
                        message_id = %record.id,
                        attempt,
                        error = %e,
                        retry_in_ms = wait.as_millis() as u64,
                        "transient posting failure; will retry"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    error!(message_id = %record.id, attempt, error = %e, "delivery failed");
                    self.settle_failed(&record, &e).await;
                    return;
                }
            }
        }
    }

    fn settle_delivered(&self, id: &str) {
        if let Err(e) = self.store.mark_delivered(id) {
            warn!(message_id = %id, error = %e, "mark_delivered failed");
            return;
        }
        // Delivered records are removable immediately.
        if let Err(e) = self.store.remove(id) {
            warn!(message_id = %id, error = %e, "failed to remove delivered record");
        }
    }

    async fn settle_failed(&self, record: &ScheduledMessage, cause: &PostError) {
        if let Err(e) = self.store.mark_failed(&record.id) {
            warn!(message_id = %record.id, error = %e, "mark_failed failed");
            return;
        }

        // Best-effort owner notice. Not retried — a notification loop on top
        // of a delivery failure helps nobody.
        let text = failure_notice(record, cause);
        if let Err(e) = self.notifier.notify(&record.owner_id, &text).await {
            warn!(message_id = %record.id, owner = %record.owner_id, error = %e, "failure notification not delivered");
        }
        if let Err(e) = self.store.remove(&record.id) {
            warn!(message_id = %record.id, error = %e, "failed to remove failed record");
        }
    }
}

/// Failure notice shown to the owner: id, intended local delivery time,
/// target and original content.
fn failure_notice(record: &ScheduledMessage, cause: &PostError) -> String {
    let when = match record.timezone_id.parse::<Tz>() {
        Ok(tz) => record
            .post_at_utc
            .with_timezone(&tz)
            .format("%Y-%m-%d %H:%M %Z")
            .to_string(),
        Err(_) => to_rfc3339_secs(record.post_at_utc),
    };
    format!(
        "Your scheduled message `{}` could not be delivered ({}).\n\
         It was due {} in {}.\n\
         Original message:\n{}",
        record.id, cause, when, record.target_id, record.content
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sendlater_core::types::MessageStatus;
    use std::time::Duration;

    use crate::testing::{claimed_record, mem_store, MockNotifier, MockPosting};

    fn delivery(
        store: Arc<ScheduleStore>,
        posting: Arc<MockPosting>,
        notifier: Arc<MockNotifier>,
    ) -> Delivery {
        Delivery::new(
            store,
            posting,
            notifier,
            RetryPolicy::new(3, Duration::ZERO),
        )
    }

    #[tokio::test]
    async fn success_marks_delivered_and_removes() {
        let store = mem_store();
        let record = claimed_record(&store, "alice", "standup time");
        let posting = Arc::new(MockPosting::succeeding());
        let notifier = Arc::new(MockNotifier::default());

        delivery(Arc::clone(&store), Arc::clone(&posting), Arc::clone(&notifier))
            .deliver(record.clone())
            .await;

        assert_eq!(posting.calls(), 1);
        assert!(store.get(&record.id).unwrap().is_none());
        assert!(notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn transient_failures_retry_until_success() {
        let store = mem_store();
        let record = claimed_record(&store, "alice", "eventually");
        let posting = Arc::new(MockPosting::failing_transient_times(2));
        let notifier = Arc::new(MockNotifier::default());

        delivery(Arc::clone(&store), Arc::clone(&posting), Arc::clone(&notifier))
            .deliver(record.clone())
            .await;

        assert_eq!(posting.calls(), 3);
        assert!(store.get(&record.id).unwrap().is_none());
        assert!(notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn transient_exhaustion_fails_with_one_notification() {
        let store = mem_store();
        let record = claimed_record(&store, "alice", "never arrives");
        let posting = Arc::new(MockPosting::always_transient());
        let notifier = Arc::new(MockNotifier::default());

        delivery(Arc::clone(&store), Arc::clone(&posting), Arc::clone(&notifier))
            .deliver(record.clone())
            .await;

        assert_eq!(posting.calls(), 3, "bounded by max_attempts");
        let notices = notifier.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].0, "alice");
        assert!(notices[0].1.contains(&record.id));
        assert!(notices[0].1.contains("never arrives"));
        // Failed record removed after the notification was attempted.
        assert!(store.get(&record.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn permanent_failure_skips_retry() {
        let store = mem_store();
        let record = claimed_record(&store, "alice", "channel is gone");
        let posting = Arc::new(MockPosting::not_found());
        let notifier = Arc::new(MockNotifier::default());

        delivery(Arc::clone(&store), Arc::clone(&posting), Arc::clone(&notifier))
            .deliver(record.clone())
            .await;

        assert_eq!(posting.calls(), 1, "permanent errors are not retried");
        assert_eq!(notifier.notices().len(), 1);
    }

    #[tokio::test]
    async fn attempts_are_recorded_on_the_claim() {
        let store = mem_store();
        let record = claimed_record(&store, "alice", "count me");
        let posting = Arc::new(MockPosting::failing_transient_times(1));
        let notifier = Arc::new(MockNotifier::default());

        // Peek before the terminal removal by using a success-after-one-retry
        // mock and checking the attempt count the store saw mid-flight is
        // reflected in total calls.
        delivery(Arc::clone(&store), Arc::clone(&posting), Arc::clone(&notifier))
            .deliver(record.clone())
            .await;
        assert_eq!(posting.calls(), 2);
    }

    #[test]
    fn failure_notice_renders_local_time() {
        let record = ScheduledMessage {
            id: "msg-1".into(),
            owner_id: "alice".into(),
            target_id: "town-square".into(),
            post_at_utc: Utc.with_ymd_and_hms(2024, 7, 4, 13, 0, 0).unwrap(),
            timezone_id: "US/Eastern".into(),
            content: "picnic!".into(),
            status: MessageStatus::Failed,
            attempts: 3,
            created_at: String::new(),
            updated_at: String::new(),
        };
        let text = failure_notice(&record, &PostError::NotFound);
        assert!(text.contains("msg-1"));
        assert!(text.contains("2024-07-04 09:00 EDT"));
        assert!(text.contains("town-square"));
        assert!(text.contains("picnic!"));
    }
}
