use thiserror::Error;

/// Errors that can occur within the schedule store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No message with the given ID exists.
    #[error("Message not found: {id}")]
    NotFound { id: String },

    /// The requester does not own the message.
    #[error("Not authorized to modify message: {id}")]
    Unauthorized { id: String },

    /// The message is no longer in a state that permits the operation
    /// (e.g. cancelling a record the engine has already claimed).
    #[error("Message {id} is in state {status}, operation not permitted")]
    Conflict { id: String, status: String },

    /// The record being inserted violates an invariant.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
