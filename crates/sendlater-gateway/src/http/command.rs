//! POST /commands/schedule — the slash-command webhook.
//!
//! The platform delivers `/schedule ...` invocations here as a form-encoded
//! payload. Replies are ephemeral (visible to the requester only); list
//! replies carry one attachment per pending message.

use std::sync::Arc;

use axum::{extract::State, Form, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use sendlater_command::{CommandError, CommandReply};

use crate::app::AppState;

/// The subset of the slash-command form fields we consume.
#[derive(Debug, Deserialize)]
pub struct SlashPayload {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub channel_id: String,
}

pub async fn command_handler(
    State(state): State<Arc<AppState>>,
    Form(payload): Form<SlashPayload>,
) -> Json<Value> {
    if let Some(expected) = &state.config.gateway.verification_token {
        if &payload.token != expected {
            warn!("slash command with bad verification token rejected");
            return ephemeral("Invalid verification token.");
        }
    }
    if payload.command != "/schedule" {
        return ephemeral(&format!(
            "Unsupported command: {}. Only /schedule is supported.",
            payload.command
        ));
    }
    if payload.user_id.is_empty() || payload.channel_id.is_empty() {
        return ephemeral("Malformed command payload.");
    }

    debug!(user = %payload.user_id, channel = %payload.channel_id, "slash command received");
    match state
        .handler
        .handle(&payload.user_id, &payload.channel_id, &payload.text)
        .await
    {
        Ok(reply) => render_reply(reply),
        Err(err) => render_error(err),
    }
}

fn render_reply(reply: CommandReply) -> Json<Value> {
    match reply {
        CommandReply::Scheduled {
            id,
            post_at_local,
            timezone_id,
            target_display,
            content,
        } => ephemeral(&format!(
            "Scheduled message `{id}` for {post_at_local} ({timezone_id}) in {target_display}:\n> {content}"
        )),
        CommandReply::Listing(entries) => {
            if entries.is_empty() {
                return ephemeral("You have no scheduled messages.");
            }
            let attachments: Vec<Value> = entries
                .iter()
                .map(|e| {
                    json!({
                        "pretext": format!("{} — {} (`{}`)", e.post_at_local, e.target_display, e.id),
                        "text": e.content,
                    })
                })
                .collect();
            Json(json!({
                "response_type": "ephemeral",
                "text": "### Scheduled messages",
                "attachments": attachments,
            }))
        }
        CommandReply::Deleted { id } => ephemeral(&format!("Deleted scheduled message `{id}`.")),
    }
}

fn render_error(err: CommandError) -> Json<Value> {
    let hint = match &err {
        CommandError::MissingAtKeyword | CommandError::MissingMessageKeyword => {
            "\nUsage: `/schedule at <time> [on <date>] message <text>` | `/schedule list` | `/schedule delete <id>`"
        }
        _ => "",
    };
    Json(json!({
        "response_type": "ephemeral",
        "text": format!("Error: {err}{hint}"),
        "error_code": err.code(),
    }))
}

fn ephemeral(text: &str) -> Json<Value> {
    Json(json!({
        "response_type": "ephemeral",
        "text": text,
    }))
}
