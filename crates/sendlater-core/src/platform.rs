//! Chat-platform collaborator interfaces.
//!
//! The scheduling core never talks to the platform directly; it goes through
//! these traits. `sendlater-gateway` provides the REST implementations, the
//! test suites provide in-memory mocks.

use async_trait::async_trait;
use thiserror::Error;

/// Failure posting a message to the platform.
///
/// The split between transient and permanent drives the delivery retry
/// policy: transient errors are retried with backoff, permanent errors fail
/// the record immediately.
#[derive(Debug, Error)]
pub enum PostError {
    /// The target channel or thread no longer exists.
    #[error("target not found")]
    NotFound,

    /// The bot is not allowed to post to the target.
    #[error("posting forbidden")]
    Forbidden,

    /// Network, rate-limit or server-side failure. Safe to retry.
    #[error("transient posting failure: {0}")]
    Transient(String),
}

impl PostError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PostError::Transient(_))
    }
}

/// Failure looking up user or channel metadata.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("directory transport error: {0}")]
    Transport(String),
}

/// User/timezone directory.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// IANA timezone identifier for a platform user.
    async fn timezone(&self, user_id: &str) -> Result<String, DirectoryError>;
}

/// Channel/thread display metadata. Used for confirmations only, never for
/// delivery correctness.
#[async_trait]
pub trait TargetDirectory: Send + Sync {
    async fn describe(&self, target_id: &str) -> Result<String, DirectoryError>;
}

/// Message-posting API.
#[async_trait]
pub trait PostingApi: Send + Sync {
    /// Post `content` to `target_id`. `author_id` is the scheduling user,
    /// carried as author context for platforms that support it.
    async fn post(&self, target_id: &str, author_id: &str, content: &str)
        -> Result<(), PostError>;
}

/// Best-effort direct notification to a user (delivery-failure notices).
#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn notify(&self, user_id: &str, text: &str) -> Result<(), PostError>;
}
