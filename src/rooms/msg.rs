use std::time::Duration;

use axum::{
    Json, debug_handler,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use time::OffsetDateTime;
use tower_sessions::Session;
use uuid::Uuid;

use crate::events::ServerEvent;
use crate::{AppError, AppResult, AppState, db, session};

use super::membership;

pub(crate) const MAX_CONTENT_LENGTH: usize = 4000;

/// Writes are fail-closed: a store that hasn't confirmed within this bound
/// fails the send rather than reporting success without durability.
const STORE_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

fn validated(content: &str) -> AppResult<&str> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::ValidationFailed(
            "message content is empty".to_owned(),
        ));
    }
    if content.chars().count() > MAX_CONTENT_LENGTH {
        return Err(AppError::ValidationFailed(format!(
            "message content exceeds {MAX_CONTENT_LENGTH} characters"
        )));
    }
    Ok(content)
}

/// The send pipeline: authorize, persist, invalidate, broadcast, in that
/// order. Broadcast never happens before the store confirms the write, so
/// no client can see a message that a concurrent read cannot yet find.
pub async fn send_message(
    state: &AppState,
    sender_id: Uuid,
    room_id: Uuid,
    content: &str,
) -> AppResult<db::Message> {
    let content = validated(content)?;

    if !membership::is_member(&state.db_pool, sender_id, room_id).await? {
        return Err(AppError::Forbidden);
    }

    let message = match tokio::time::timeout(
        STORE_WRITE_TIMEOUT,
        db::append_message(&state.db_pool, room_id, sender_id, content),
    )
    .await
    {
        Ok(persisted) => persisted?,
        Err(_) => return Err(AppError::StoreTimeout),
    };

    // One token bump orphans every cached page variant for the room.
    state.versions.bump(room_id);

    let exclude = (!state.config.echo_to_sender).then_some(sender_id);
    state.router.broadcast(
        room_id,
        &ServerEvent::MessageReceived {
            message: message.clone(),
        },
        exclude,
    );

    Ok(message)
}

/// Sender-only edit. Invalidates the room's cached history exactly like a
/// send; the message stays in its room forever.
pub async fn edit_message(
    state: &AppState,
    editor_id: Uuid,
    room_id: Uuid,
    message_id: Uuid,
    new_content: &str,
) -> AppResult<db::Message> {
    let new_content = validated(new_content)?;

    let Some(mut message) = db::fetch_message(&state.db_pool, message_id).await? else {
        // don't leak which message ids exist
        return Err(AppError::Forbidden);
    };
    if message.room_id != room_id || message.sender_id != editor_id {
        return Err(AppError::Forbidden);
    }

    let edited_at = OffsetDateTime::now_utc();
    db::apply_edit(&state.db_pool, message_id, new_content, edited_at).await?;
    state.versions.bump(room_id);

    message.content = new_content.to_owned();
    message.edited = true;
    message.edited_at = Some(edited_at);
    Ok(message)
}

/// Idempotent: re-marking the same message leaves exactly one receipt and
/// notifies the message's sender only the first time.
pub async fn mark_read(state: &AppState, user_id: Uuid, message_id: Uuid) -> AppResult<()> {
    let Some((room_id, sender_id)) =
        db::message_room_and_sender(&state.db_pool, message_id).await?
    else {
        return Ok(());
    };

    let read_at = OffsetDateTime::now_utc();
    let created = db::insert_receipt(&state.db_pool, user_id, message_id, read_at).await?;
    db::touch_last_read(&state.db_pool, user_id, room_id, read_at).await?;

    if created {
        state
            .registry
            .send_to_user(sender_id, &ServerEvent::MessageRead { message_id, user_id });
    }
    Ok(())
}

#[derive(Deserialize)]
pub(crate) struct SendMessageQuery {
    content: String,
}

#[debug_handler]
pub(crate) async fn send_message_handler(
    State(state): State<AppState>,
    session: Session,
    Path(room_id): Path<Uuid>,
    Json(SendMessageQuery { content }): Json<SendMessageQuery>,
) -> AppResult<Json<db::Message>> {
    let user_id = session::current_user_id(&session).await?;
    Ok(Json(send_message(&state, user_id, room_id, &content).await?))
}

#[debug_handler]
pub(crate) async fn edit_message_handler(
    State(state): State<AppState>,
    session: Session,
    Path((room_id, message_id)): Path<(Uuid, Uuid)>,
    Json(SendMessageQuery { content }): Json<SendMessageQuery>,
) -> AppResult<Json<db::Message>> {
    let user_id = session::current_user_id(&session).await?;
    Ok(Json(
        edit_message(&state, user_id, room_id, message_id, &content).await?,
    ))
}

#[debug_handler]
pub(crate) async fn mark_read_handler(
    State(state): State<AppState>,
    session: Session,
    Path(message_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let user_id = session::current_user_id(&session).await?;
    mark_read(&state, user_id, message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
