//! Slash-command text parser.
//!
//! Grammar (keywords case-insensitive, order fixed):
//!
//! ```text
//! "at" TIME ["on" DATE] "message" TEXT
//! "list"
//! "delete" ID
//! ```
//!
//! Everything after the `message` keyword is verbatim content — further
//! occurrences of `at`/`on` belong to the message. Range validity of the
//! time/date tokens is the resolver's job; this module only checks shape.

use uuid::Uuid;

use crate::error::{CommandError, Result};

/// A recognized command, before time/date resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    Schedule {
        time_token: String,
        date_token: Option<String>,
        message: String,
    },
    List,
    Delete {
        id: String,
    },
}

/// Parse raw slash-command text into a [`ParsedCommand`].
pub fn parse(raw: &str) -> Result<ParsedCommand> {
    let tokens = tokenize(raw);
    let Some(&(_, first)) = tokens.first() else {
        return Err(CommandError::MissingAtKeyword);
    };

    if first.eq_ignore_ascii_case("list") && tokens.len() == 1 {
        return Ok(ParsedCommand::List);
    }

    if first.eq_ignore_ascii_case("delete") {
        let Some(&(_, id)) = tokens.get(1) else {
            return Err(CommandError::InvalidMessageId("missing id".into()));
        };
        if tokens.len() > 2 || Uuid::parse_str(id).is_err() {
            return Err(CommandError::InvalidMessageId(id.to_string()));
        }
        return Ok(ParsedCommand::Delete { id: id.to_string() });
    }

    parse_schedule(raw, &tokens)
}

fn parse_schedule(raw: &str, tokens: &[(usize, &str)]) -> Result<ParsedCommand> {
    let (_, first) = tokens[0];
    if !first.eq_ignore_ascii_case("at") {
        return Err(CommandError::MissingAtKeyword);
    }

    let Some(&(_, time_token)) = tokens.get(1) else {
        return Err(CommandError::InvalidTimeFormat("missing time after `at`".into()));
    };
    // Shape only: a time token starts with a digit. The resolver range-checks.
    if !time_token.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(CommandError::InvalidTimeFormat(time_token.to_string()));
    }

    let mut idx = 2;
    let mut date_token = None;
    if let Some(&(_, kw)) = tokens.get(idx) {
        if kw.eq_ignore_ascii_case("on") {
            let Some(&(_, date)) = tokens.get(idx + 1) else {
                return Err(CommandError::InvalidDateFormat("missing date after `on`".into()));
            };
            if !date.starts_with(|c: char| c.is_ascii_digit()) {
                return Err(CommandError::InvalidDateFormat(date.to_string()));
            }
            date_token = Some(date.to_string());
            idx += 2;
        }
    }

    let Some(&(offset, kw)) = tokens.get(idx) else {
        return Err(CommandError::MissingMessageKeyword);
    };
    if !kw.eq_ignore_ascii_case("message") {
        return Err(CommandError::MissingMessageKeyword);
    }

    let message = raw[offset + kw.len()..].trim();
    if message.is_empty() {
        return Err(CommandError::EmptyMessage);
    }

    Ok(ParsedCommand::Schedule {
        time_token: time_token.to_string(),
        date_token,
        message: message.to_string(),
    })
}

/// Split on whitespace, keeping each token's byte offset so the verbatim
/// message tail can be sliced out of the raw text.
fn tokenize(raw: &str) -> Vec<(usize, &str)> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    for (i, ch) in raw.char_indices() {
        if ch.is_whitespace() {
            if let Some(s) = start.take() {
                tokens.push((s, &raw[s..i]));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        tokens.push((s, &raw[s..]));
    }
    tokens
}
