pub mod broadcast;
pub mod history;
pub mod membership;
pub mod msg;
mod new;
pub mod typing;
pub mod ws;

use axum::{
    Json, Router, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::events::ServerEvent;
use crate::{AppError, AppResult, AppState, db, session};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/new", post(new::new_room))
        .route(
            "/{room_id}/messages",
            get(history::recent_messages_handler).post(msg::send_message_handler),
        )
        .route(
            "/{room_id}/messages/{message_id}",
            axum::routing::patch(msg::edit_message_handler),
        )
        .route("/{room_id}/join", post(join_room_handler))
        .route("/{room_id}/leave", post(leave_room_handler))
        .route("/{room_id}/typing", post(typing_handler))
        .route("/{room_id}/members", post(add_member_handler))
        .route(
            "/{room_id}/members/{user_id}",
            delete(remove_member_handler).patch(set_admin_handler),
        )
        .route("/messages/{message_id}/read", post(msg::mark_read_handler))
}

async fn room_privacy(pool: &SqlitePool, room_id: Uuid) -> AppResult<Option<bool>> {
    let row: Option<(bool,)> = sqlx::query_as("SELECT is_private FROM rooms WHERE id=?")
        .bind(room_id.to_string())
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(is_private,)| is_private))
}

/// Explicit join. Members re-validate and resubscribe; non-members may
/// self-join a public room, while a private room stays `Forbidden` until an
/// admin adds them. Every live connection of the user is subscribed, and
/// the room is told who arrived.
pub async fn join_room(state: &AppState, user_id: Uuid, room_id: Uuid) -> AppResult<()> {
    if !membership::is_member(&state.db_pool, user_id, room_id).await? {
        match room_privacy(&state.db_pool, room_id).await? {
            Some(false) => membership::add_member(&state.db_pool, user_id, room_id, false).await?,
            Some(true) | None => return Err(AppError::Forbidden),
        }
    }

    for (conn_id, tx) in state.registry.senders_for(user_id) {
        state.router.subscribe(room_id, conn_id, user_id, tx);
    }

    let username = db::username(&state.db_pool, user_id).await?;
    state.router.broadcast(
        room_id,
        &ServerEvent::UserJoined {
            user_id,
            username,
            room_id,
        },
        None,
    );
    Ok(())
}

/// Explicit leave: destroys the membership, cuts every subscription of the
/// user immediately and tells the room. Distinct from a mere disconnect,
/// which broadcasts nothing.
pub async fn leave_room(state: &AppState, user_id: Uuid, room_id: Uuid) -> AppResult<()> {
    if !membership::is_member(&state.db_pool, user_id, room_id).await? {
        return Err(AppError::Forbidden);
    }
    membership::remove_member(state, user_id, room_id).await
}

#[debug_handler]
async fn join_room_handler(
    State(state): State<AppState>,
    session: Session,
    Path(room_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let user_id = session::current_user_id(&session).await?;
    join_room(&state, user_id, room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler]
async fn leave_room_handler(
    State(state): State<AppState>,
    session: Session,
    Path(room_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let user_id = session::current_user_id(&session).await?;
    leave_room(&state, user_id, room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler]
async fn typing_handler(
    State(state): State<AppState>,
    session: Session,
    Path(room_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let user_id = session::current_user_id(&session).await?;
    typing::signal_typing(&state, user_id, room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct AddMemberQuery {
    user_id: Uuid,
    #[serde(default)]
    is_admin: bool,
}

#[debug_handler]
async fn add_member_handler(
    State(state): State<AppState>,
    session: Session,
    Path(room_id): Path<Uuid>,
    Json(AddMemberQuery { user_id, is_admin }): Json<AddMemberQuery>,
) -> AppResult<StatusCode> {
    let caller = session::current_user_id(&session).await?;
    if !membership::is_admin(&state.db_pool, caller, room_id).await? {
        return Err(AppError::Forbidden);
    }
    membership::add_member(&state.db_pool, user_id, room_id, is_admin).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler]
async fn remove_member_handler(
    State(state): State<AppState>,
    session: Session,
    Path((room_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let caller = session::current_user_id(&session).await?;
    // admins may kick; anyone may remove themselves
    if caller != user_id && !membership::is_admin(&state.db_pool, caller, room_id).await? {
        return Err(AppError::Forbidden);
    }
    membership::remove_member(&state, user_id, room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct SetAdminQuery {
    is_admin: bool,
}

#[debug_handler]
async fn set_admin_handler(
    State(state): State<AppState>,
    session: Session,
    Path((room_id, user_id)): Path<(Uuid, Uuid)>,
    Json(SetAdminQuery { is_admin }): Json<SetAdminQuery>,
) -> AppResult<StatusCode> {
    let caller = session::current_user_id(&session).await?;
    if !membership::is_admin(&state.db_pool, caller, room_id).await? {
        return Err(AppError::Forbidden);
    }
    membership::set_admin(&state.db_pool, user_id, room_id, is_admin).await?;
    Ok(StatusCode::NO_CONTENT)
}
