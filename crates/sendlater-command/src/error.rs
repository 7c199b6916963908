use thiserror::Error;

use sendlater_store::StoreError;

/// Errors surfaced on the synchronous request path.
///
/// Parsing and resolution failures are returned to the requester immediately,
/// never retried and never stored.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("expected `at <time>` before the message")]
    MissingAtKeyword,

    #[error("expected `message <text>` after the time")]
    MissingMessageKeyword,

    #[error("message text is empty")]
    EmptyMessage,

    #[error("invalid time: {0}")]
    InvalidTimeFormat(String),

    #[error("invalid date: {0}")]
    InvalidDateFormat(String),

    #[error("unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("invalid message id: {0}")]
    InvalidMessageId(String),

    #[error("that time is in the past")]
    PastInstant,

    #[error("no scheduled message with id {id}")]
    NotFound { id: String },

    #[error("message {id} belongs to another user")]
    Unauthorized { id: String },

    #[error("message {id} is already being delivered")]
    Conflict { id: String },

    /// Store/directory failures on the request path. No partial state is
    /// left behind; the requester gets a generic failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CommandError {
    /// Short error code string carried in command responses.
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::MissingAtKeyword => "MISSING_AT_KEYWORD",
            CommandError::MissingMessageKeyword => "MISSING_MESSAGE_KEYWORD",
            CommandError::EmptyMessage => "EMPTY_MESSAGE",
            CommandError::InvalidTimeFormat(_) => "INVALID_TIME_FORMAT",
            CommandError::InvalidDateFormat(_) => "INVALID_DATE_FORMAT",
            CommandError::InvalidTimezone(_) => "INVALID_TIMEZONE",
            CommandError::InvalidMessageId(_) => "INVALID_MESSAGE_ID",
            CommandError::PastInstant => "PAST_INSTANT",
            CommandError::NotFound { .. } => "NOT_FOUND",
            CommandError::Unauthorized { .. } => "UNAUTHORIZED",
            CommandError::Conflict { .. } => "CONFLICT",
            CommandError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<StoreError> for CommandError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id } => CommandError::NotFound { id },
            StoreError::Unauthorized { id } => CommandError::Unauthorized { id },
            StoreError::Conflict { id, .. } => CommandError::Conflict { id },
            StoreError::Database(e) => CommandError::Internal(e.to_string()),
            StoreError::InvalidMessage(m) => CommandError::Internal(m),
        }
    }
}

pub type Result<T> = std::result::Result<T, CommandError>;
