//! `sendlater-scheduler` — delivery timing and execution.
//!
//! [`engine::SchedulerEngine`] sleeps until the earliest pending instant
//! (re-derived from the store on every wake, never cached), claims due
//! records atomically, and hands each to [`delivery::Delivery`] in its own
//! task so one slow post never delays the rest.

pub mod delivery;
pub mod engine;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use delivery::Delivery;
pub use engine::SchedulerEngine;
pub use retry::RetryPolicy;
