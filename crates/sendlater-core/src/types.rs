use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Render a UTC instant as RFC 3339 at second precision.
///
/// All timestamps stored in SQLite use this format so that lexicographic
/// comparison in SQL (`post_at_utc <= ?`) agrees with chronological order.
pub fn to_rfc3339_secs(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Lifecycle state of a scheduled message.
///
/// Transitions are forward-only: `Pending → Claimed → {Delivered | Failed}`,
/// or `Pending → Cancelled`. A claimed record can no longer be cancelled —
/// a cancellation racing a claim loses and the message is delivered or fails
/// normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Waiting for its post_at_utc instant.
    Pending,
    /// Picked up by the scheduler engine; delivery in flight.
    Claimed,
    /// Posted successfully. Eligible for removal from the store.
    Delivered,
    /// Delivery failed after retry exhaustion (or a permanent error).
    /// Retained until the owner notification has been attempted.
    Failed,
    /// Cancelled by its owner before delivery.
    Cancelled,
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Claimed => "claimed",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Failed => "failed",
            MessageStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MessageStatus::Pending),
            "claimed" => Ok(MessageStatus::Claimed),
            "delivered" => Ok(MessageStatus::Delivered),
            "failed" => Ok(MessageStatus::Failed),
            "cancelled" => Ok(MessageStatus::Cancelled),
            other => Err(format!("unknown message status: {other}")),
        }
    }
}

/// A persisted scheduled-message record.
///
/// The store hands out value snapshots of this struct; no component holds a
/// shared mutable reference across calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledMessage {
    /// UUID v7 string — primary key, time-ordered.
    pub id: String,
    /// Platform user ID of the requester. Only this user may cancel.
    pub owner_id: String,
    /// Channel or direct-message-thread ID the message is delivered to.
    pub target_id: String,
    /// Absolute delivery instant.
    pub post_at_utc: DateTime<Utc>,
    /// IANA timezone identifier of the owner at creation time.
    /// Retained for display only; never re-resolved.
    pub timezone_id: String,
    /// Message body. Non-empty.
    pub content: String,
    /// Current lifecycle state.
    pub status: MessageStatus,
    /// Number of delivery attempts made so far.
    pub attempts: u32,
    /// ISO-8601 timestamp of record creation.
    pub created_at: String,
    /// ISO-8601 timestamp of the last state change.
    pub updated_at: String,
}

/// Fields supplied by the command handler when scheduling a message.
/// The store fills in the id, status and timestamps.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub owner_id: String,
    pub target_id: String,
    pub post_at_utc: DateTime<Utc>,
    pub timezone_id: String,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            MessageStatus::Pending,
            MessageStatus::Claimed,
            MessageStatus::Delivered,
            MessageStatus::Failed,
            MessageStatus::Cancelled,
        ] {
            let s = status.to_string();
            assert_eq!(s.parse::<MessageStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!("running".parse::<MessageStatus>().is_err());
    }

    #[test]
    fn rfc3339_secs_has_no_subseconds() {
        let dt = DateTime::parse_from_rfc3339("2024-03-01T12:30:45.678Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(to_rfc3339_secs(dt), "2024-03-01T12:30:45Z");
    }
}
