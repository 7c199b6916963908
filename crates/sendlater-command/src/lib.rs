//! `sendlater-command` — the request path: command text in, typed reply out.
//!
//! [`parse::parse`] tokenizes the slash-command text, [`resolve::resolve`]
//! turns the time/date tokens into an absolute UTC instant in the owner's
//! timezone, and [`handler::CommandHandler`] orchestrates both against the
//! store for `schedule`, `list` and `delete`.

pub mod error;
pub mod handler;
pub mod parse;
pub mod resolve;

pub use error::{CommandError, Result};
pub use handler::{CommandHandler, CommandReply, ListEntry};
pub use parse::{parse, ParsedCommand};
pub use resolve::resolve;
