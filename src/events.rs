use axum::extract::ws;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::Message;

/// Events pushed to live connections. Serialized as JSON text frames,
/// tagged by `event` so clients can dispatch without peeking at fields.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum ServerEvent {
    #[serde(rename = "message.received")]
    MessageReceived { message: Message },
    #[serde(rename = "user.typing")]
    UserTyping {
        user_id: Uuid,
        username: String,
        room_id: Uuid,
        /// Receivers drop the indicator once this passes; no clock
        /// agreement with the server is assumed beyond this stamp.
        #[serde(with = "time::serde::rfc3339")]
        expires_at: OffsetDateTime,
    },
    #[serde(rename = "user.joined")]
    UserJoined {
        user_id: Uuid,
        username: String,
        room_id: Uuid,
    },
    #[serde(rename = "user.left")]
    UserLeft {
        user_id: Uuid,
        username: String,
        room_id: Uuid,
    },
    #[serde(rename = "message.read")]
    MessageRead { message_id: Uuid, user_id: Uuid },
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn to_ws_message(&self) -> Option<ws::Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(ws::Message::Text(json.into())),
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize server event");
                None
            }
        }
    }
}

/// Commands a client may issue over its WebSocket, tagged by `op`.
/// A command that fails is answered with an `error` event on that
/// connection only; the connection itself stays up.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClientCommand {
    Send { room_id: Uuid, content: String },
    Typing { room_id: Uuid },
    MarkRead { message_id: Uuid },
    Join { room_id: Uuid },
    Leave { room_id: Uuid },
}
