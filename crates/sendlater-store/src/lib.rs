//! `sendlater-store` — durable schedule store backed by SQLite.
//!
//! The single shared mutable resource of the system. All cross-component
//! coordination (scheduling vs. delivery vs. cancellation) happens through
//! the conditional state transitions in [`store::ScheduleStore`], so the
//! design stays correct with multiple handler instances sharing one
//! database file.

pub mod db;
pub mod error;
pub mod store;

pub use error::{Result, StoreError};
pub use store::ScheduleStore;
