//! The membership authority: every hot-path operation (send, join, typing)
//! re-checks against the store here instead of trusting a snapshot taken at
//! connect time, because membership can change mid-session. Lookups hit the
//! `(user_id, room_id)` primary key, never a scan.

use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::events::ServerEvent;
use crate::{AppResult, AppState, db};

pub async fn is_member(pool: &SqlitePool, user_id: Uuid, room_id: Uuid) -> AppResult<bool> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM members WHERE user_id=? AND room_id=?")
            .bind(user_id.to_string())
            .bind(room_id.to_string())
            .fetch_optional(pool)
            .await?;
    Ok(row.is_some())
}

pub async fn is_admin(pool: &SqlitePool, user_id: Uuid, room_id: Uuid) -> AppResult<bool> {
    let row: Option<(bool,)> =
        sqlx::query_as("SELECT is_admin FROM members WHERE user_id=? AND room_id=?")
            .bind(user_id.to_string())
            .bind(room_id.to_string())
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(admin,)| admin).unwrap_or(false))
}

pub async fn rooms_for(pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<Uuid>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT room_id FROM members WHERE user_id=?")
        .bind(user_id.to_string())
        .fetch_all(pool)
        .await?;

    let mut rooms = Vec::with_capacity(rows.len());
    for (room_id,) in rows {
        rooms.push(Uuid::parse_str(&room_id)?);
    }
    Ok(rooms)
}

/// Adds a membership row. A user cannot be a member of the same room twice;
/// re-adding is a no-op.
pub async fn add_member(
    pool: &SqlitePool,
    user_id: Uuid,
    room_id: Uuid,
    admin: bool,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO members (user_id,room_id,is_admin,joined_at,last_read) VALUES (?,?,?,?,?) \
         ON CONFLICT (user_id,room_id) DO NOTHING",
    )
    .bind(user_id.to_string())
    .bind(room_id.to_string())
    .bind(admin)
    .bind(OffsetDateTime::now_utc())
    .bind(OffsetDateTime::now_utc())
    .execute(pool)
    .await?;
    Ok(())
}

/// Destroys the membership and immediately cuts every live subscription of
/// that user to the room, then tells the remaining members. Messages the
/// user already sent persist.
pub async fn remove_member(state: &AppState, user_id: Uuid, room_id: Uuid) -> AppResult<()> {
    sqlx::query("DELETE FROM members WHERE user_id=? AND room_id=?")
        .bind(user_id.to_string())
        .bind(room_id.to_string())
        .execute(&state.db_pool)
        .await?;

    state.router.unsubscribe_user(room_id, user_id);

    let username = db::username(&state.db_pool, user_id).await?;
    state.router.broadcast(
        room_id,
        &ServerEvent::UserLeft {
            user_id,
            username,
            room_id,
        },
        None,
    );
    Ok(())
}

pub async fn set_admin(
    pool: &SqlitePool,
    user_id: Uuid,
    room_id: Uuid,
    admin: bool,
) -> AppResult<()> {
    sqlx::query("UPDATE members SET is_admin=? WHERE user_id=? AND room_id=?")
        .bind(admin)
        .bind(user_id.to_string())
        .bind(room_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}
