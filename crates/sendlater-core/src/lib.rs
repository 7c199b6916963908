//! `sendlater-core` — shared types, configuration and platform interfaces.
//!
//! Everything the other crates agree on lives here: the persisted
//! [`types::ScheduledMessage`] record and its status machine, the
//! `sendlater.toml` configuration layer, and the traits through which the
//! rest of the system talks to the chat platform (posting, user/channel
//! directory, notifications).

pub mod config;
pub mod error;
pub mod platform;
pub mod types;

pub use error::{CoreError, Result};
pub use types::{MessageStatus, NewMessage, ScheduledMessage};
