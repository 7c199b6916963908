//! The wait/wake loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

use sendlater_store::ScheduleStore;

use crate::delivery::Delivery;

/// Upper bound on one sleep when no message is pending. The wake [`Notify`]
/// cuts this short whenever a handler inserts or cancels.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// Pause before re-reading the store after a query failure.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Core timing loop: sleeps until the earliest pending instant and dispatches
/// due records to [`Delivery`], one task per record.
///
/// The next wake time is re-derived from the store on every iteration rather
/// than cached, so a restart resumes exactly where the table says — the store
/// is the only source of truth.
pub struct SchedulerEngine {
    store: Arc<ScheduleStore>,
    delivery: Arc<Delivery>,
    wake: Arc<Notify>,
}

impl SchedulerEngine {
    pub fn new(store: Arc<ScheduleStore>, delivery: Arc<Delivery>, wake: Arc<Notify>) -> Self {
        Self {
            store,
            delivery,
            wake,
        }
    }

    /// Main loop. Runs until `shutdown` broadcasts `true`.
    ///
    /// The first actions on startup recover from whatever a previous process
    /// left behind: claims stranded by a crash go back to pending, then one
    /// immediate sweep picks up everything that came due while the process
    /// was down.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("scheduler engine started");
        match self.store.release_claims() {
            Ok(0) => {}
            Ok(n) => info!(count = n, "recovered in-flight claims from previous run"),
            Err(e) => error!("claim recovery failed: {e}"),
        }
        self.sweep();

        loop {
            let wait = match self.store.next_due_at() {
                Ok(Some(at)) => (at - Utc::now()).to_std().unwrap_or(Duration::ZERO),
                Ok(None) => IDLE_WAIT,
                Err(e) => {
                    error!("next_due_at query failed: {e}");
                    ERROR_BACKOFF
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.wake.notified() => {
                    debug!("woken early by insert/cancel");
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }

            self.sweep();
        }
    }

    /// Claim everything due right now and dispatch each record to its own
    /// delivery task. A slow post in one task never holds back the others —
    /// the loop returns to sleep immediately.
    fn sweep(&self) {
        let claimed = match self.store.claim_due(Utc::now()) {
            Ok(claimed) => claimed,
            Err(e) => {
                error!("claim_due failed: {e}");
                return;
            }
        };
        for record in claimed {
            let delivery = Arc::clone(&self.delivery);
            tokio::spawn(async move {
                delivery.deliver(record).await;
            });
        }

        if let Err(e) = self.store.purge_terminal() {
            warn!("terminal purge failed: {e}");
        }
    }
}
