//! REST client for a Mattermost-compatible chat platform.
//!
//! Implements all four collaborator traits the core consumes: posting,
//! user/timezone directory, target display lookup, and direct-message
//! failure notifications.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use sendlater_core::config::PlatformConfig;
use sendlater_core::platform::{
    DirectoryError, NotificationApi, PostError, PostingApi, TargetDirectory, UserDirectory,
};

pub struct PlatformClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    bot_user_id: String,
}

impl PlatformClient {
    pub fn new(config: &PlatformConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
            bot_user_id: config.bot_user_id.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn create_post(&self, channel_id: &str, message: &str) -> Result<(), PostError> {
        let resp = self
            .client
            .post(self.url("/api/v4/posts"))
            .bearer_auth(&self.token)
            .json(&json!({
                "channel_id": channel_id,
                "message": message,
            }))
            .send()
            .await
            .map_err(|e| PostError::Transient(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), channel = %channel_id, body = %body, "post rejected");
        Err(classify_status(status, body))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
    ) -> Result<T, DirectoryError> {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(DirectoryError::Api {
                status: status.as_u16(),
                message,
            });
        }
        resp.json::<T>()
            .await
            .map_err(|e| DirectoryError::Transport(e.to_string()))
    }
}

/// Map an HTTP failure to the retry taxonomy: 404/403 are permanent,
/// everything else (429, 5xx, protocol oddities) is worth retrying.
fn classify_status(status: StatusCode, body: String) -> PostError {
    match status {
        StatusCode::NOT_FOUND => PostError::NotFound,
        StatusCode::FORBIDDEN => PostError::Forbidden,
        other => PostError::Transient(format!("status {other}: {body}")),
    }
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    #[serde(default)]
    timezone: Option<UserTimezone>,
}

/// Mattermost's timezone block. All three fields are strings; the automatic
/// flag arrives as "true"/"false".
#[derive(Debug, Deserialize, Default)]
struct UserTimezone {
    #[serde(rename = "useAutomaticTimezone", default)]
    use_automatic: String,
    #[serde(rename = "automaticTimezone", default)]
    automatic: String,
    #[serde(rename = "manualTimezone", default)]
    manual: String,
}

impl UserTimezone {
    fn resolve(&self) -> Option<&str> {
        if self.use_automatic == "true" && !self.automatic.is_empty() {
            Some(&self.automatic)
        } else if !self.manual.is_empty() {
            Some(&self.manual)
        } else if !self.automatic.is_empty() {
            Some(&self.automatic)
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct DirectChannel {
    id: String,
}

#[async_trait]
impl PostingApi for PlatformClient {
    async fn post(
        &self,
        target_id: &str,
        author_id: &str,
        content: &str,
    ) -> Result<(), PostError> {
        debug!(target = %target_id, author = %author_id, "posting scheduled message");
        self.create_post(target_id, content).await
    }
}

#[async_trait]
impl UserDirectory for PlatformClient {
    async fn timezone(&self, user_id: &str) -> Result<String, DirectoryError> {
        let user: UserResponse = self.get_json(&format!("/api/v4/users/{user_id}")).await?;
        // A user who never picked a timezone gets UTC; the resolver treats
        // the identifier as authoritative either way.
        Ok(user
            .timezone
            .as_ref()
            .and_then(|tz| tz.resolve())
            .unwrap_or("UTC")
            .to_string())
    }
}

#[async_trait]
impl TargetDirectory for PlatformClient {
    async fn describe(&self, target_id: &str) -> Result<String, DirectoryError> {
        let channel: ChannelResponse = self
            .get_json(&format!("/api/v4/channels/{target_id}"))
            .await?;
        if !channel.display_name.is_empty() {
            Ok(channel.display_name)
        } else if !channel.name.is_empty() {
            Ok(channel.name)
        } else {
            Ok(target_id.to_string())
        }
    }
}

#[async_trait]
impl NotificationApi for PlatformClient {
    async fn notify(&self, user_id: &str, text: &str) -> Result<(), PostError> {
        // Open (or fetch) the bot↔user DM channel, then post into it.
        let resp = self
            .client
            .post(self.url("/api/v4/channels/direct"))
            .bearer_auth(&self.token)
            .json(&json!([self.bot_user_id, user_id]))
            .send()
            .await
            .map_err(|e| PostError::Transient(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }
        let dm: DirectChannel = resp
            .json()
            .await
            .map_err(|e| PostError::Transient(e.to_string()))?;

        self.create_post(&dm.id, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification_matches_retry_taxonomy() {
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, String::new()),
            PostError::NotFound
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, String::new()),
            PostError::Forbidden
        ));
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()).is_transient());
        assert!(classify_status(StatusCode::BAD_GATEWAY, String::new()).is_transient());
    }

    #[test]
    fn timezone_resolution_prefers_the_active_choice() {
        let auto = UserTimezone {
            use_automatic: "true".into(),
            automatic: "Europe/Berlin".into(),
            manual: "US/Pacific".into(),
        };
        assert_eq!(auto.resolve(), Some("Europe/Berlin"));

        let manual = UserTimezone {
            use_automatic: "false".into(),
            automatic: "Europe/Berlin".into(),
            manual: "US/Pacific".into(),
        };
        assert_eq!(manual.resolve(), Some("US/Pacific"));

        let unset = UserTimezone::default();
        assert_eq!(unset.resolve(), None);
    }

    #[test]
    fn user_response_tolerates_missing_timezone_block() {
        let user: UserResponse = serde_json::from_str(r#"{"id":"u1","username":"alice"}"#).unwrap();
        assert!(user.timezone.is_none());
    }
}
