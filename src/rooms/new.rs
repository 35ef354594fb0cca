use axum::{
    Json, debug_handler,
    extract::State,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppError, AppResult, AppState, session};

use super::membership;

#[derive(Debug, Deserialize)]
pub(crate) struct NewRoomQuery {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    is_private: bool,
}

#[derive(Serialize)]
pub(crate) struct NewRoomResponse {
    id: Uuid,
}

/// Creates a room; the creator becomes its owner and first (admin) member,
/// and every live connection they hold is subscribed right away.
#[debug_handler]
pub(crate) async fn new_room(
    State(state): State<AppState>,
    session: Session,
    Json(NewRoomQuery {
        name,
        description,
        is_private,
    }): Json<NewRoomQuery>,
) -> AppResult<Json<NewRoomResponse>> {
    let user_id = session::current_user_id(&session).await?;

    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::ValidationFailed("room name is empty".to_owned()));
    }

    let room_id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO rooms (id,name,description,is_private,owner_id,created_at) VALUES (?,?,?,?,?,?)",
    )
    .bind(room_id.to_string())
    .bind(name)
    .bind(&description)
    .bind(is_private)
    .bind(user_id.to_string())
    .bind(OffsetDateTime::now_utc())
    .execute(&state.db_pool)
    .await?;

    membership::add_member(&state.db_pool, user_id, room_id, true).await?;
    for (conn_id, tx) in state.registry.senders_for(user_id) {
        state.router.subscribe(room_id, conn_id, user_id, tx);
    }

    Ok(Json(NewRoomResponse { id: room_id }))
}
