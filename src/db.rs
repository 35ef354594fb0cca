//! The durable message store. Single source of truth; the cache layer is
//! derived from it and may be dropped at any time.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{AppResult, include_res};

pub async fn apply_schema(pool: &SqlitePool) -> AppResult<()> {
    sqlx::raw_sql(include_res!(str, "/schema.sql")).execute(pool).await?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
    pub edited: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub edited_at: Option<OffsetDateTime>,
}

/// Display name for a user, falling back to a derived placeholder when the
/// identity subsystem hasn't written a row for them yet.
pub async fn username(pool: &SqlitePool, user_id: Uuid) -> AppResult<String> {
    let row: Option<(String,)> = sqlx::query_as("SELECT username FROM users WHERE id=?")
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await?;

    Ok(row
        .map(|(name,)| name)
        .unwrap_or_else(|| placeholder_username(user_id)))
}

fn placeholder_username(user_id: Uuid) -> String {
    format!("user-{}", &user_id.simple().to_string()[..8])
}

/// Appends a message; the store assigns the canonical id and timestamp.
/// The sender lookup runs before the INSERT so an error surfaced here
/// implies no row was written.
pub async fn append_message(
    pool: &SqlitePool,
    room_id: Uuid,
    sender_id: Uuid,
    content: &str,
) -> AppResult<Message> {
    let sender_username = username(pool, sender_id).await?;

    let id = Uuid::now_v7();
    let sent_at = OffsetDateTime::now_utc();

    sqlx::query("INSERT INTO messages (id,room_id,sender_id,content,sent_at,edited) VALUES (?,?,?,?,?,0)")
        .bind(id.to_string())
        .bind(room_id.to_string())
        .bind(sender_id.to_string())
        .bind(content)
        .bind(sent_at)
        .execute(pool)
        .await?;

    Ok(Message {
        id,
        room_id,
        sender_id,
        sender_username,
        content: content.to_owned(),
        sent_at,
        edited: false,
        edited_at: None,
    })
}

/// One reverse-chronological page plus the room's total message count.
/// Newest first, ties broken by id (v7 ids are time-ordered, so the
/// tiebreak is deterministic and agrees with insertion order).
pub async fn page_messages(
    pool: &SqlitePool,
    room_id: Uuid,
    page: u32,
    page_size: u32,
) -> AppResult<(Vec<Message>, i64)> {
    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE room_id=?")
        .bind(room_id.to_string())
        .fetch_one(pool)
        .await?;

    let rows: Vec<(String, String, Option<String>, String, OffsetDateTime, bool, Option<OffsetDateTime>)> =
        sqlx::query_as(
            "SELECT m.id,m.sender_id,u.username,m.content,m.sent_at,m.edited,m.edited_at \
             FROM messages m LEFT JOIN users u ON u.id=m.sender_id \
             WHERE m.room_id=? ORDER BY m.sent_at DESC, m.id DESC LIMIT ? OFFSET ?",
        )
        .bind(room_id.to_string())
        .bind(page_size as i64)
        .bind((page.saturating_sub(1) as i64) * page_size as i64)
        .fetch_all(pool)
        .await?;

    let mut items = Vec::with_capacity(rows.len());
    for (id, sender_id, sender_username, content, sent_at, edited, edited_at) in rows {
        let sender_id = Uuid::parse_str(&sender_id)?;
        items.push(Message {
            id: Uuid::parse_str(&id)?,
            room_id,
            sender_id,
            sender_username: sender_username.unwrap_or_else(|| placeholder_username(sender_id)),
            content,
            sent_at,
            edited,
            edited_at,
        });
    }

    Ok((items, total))
}

pub async fn fetch_message(pool: &SqlitePool, message_id: Uuid) -> AppResult<Option<Message>> {
    let row: Option<(String, String, String, OffsetDateTime, bool, Option<OffsetDateTime>)> =
        sqlx::query_as(
            "SELECT room_id,sender_id,content,sent_at,edited,edited_at FROM messages WHERE id=?",
        )
        .bind(message_id.to_string())
        .fetch_optional(pool)
        .await?;

    let Some((room_id, sender_id, content, sent_at, edited, edited_at)) = row else {
        return Ok(None);
    };
    let sender_id = Uuid::parse_str(&sender_id)?;

    Ok(Some(Message {
        id: message_id,
        room_id: Uuid::parse_str(&room_id)?,
        sender_id,
        sender_username: username(pool, sender_id).await?,
        content,
        sent_at,
        edited,
        edited_at,
    }))
}

pub async fn message_room_and_sender(
    pool: &SqlitePool,
    message_id: Uuid,
) -> AppResult<Option<(Uuid, Uuid)>> {
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT room_id,sender_id FROM messages WHERE id=?")
            .bind(message_id.to_string())
            .fetch_optional(pool)
            .await?;

    match row {
        Some((room_id, sender_id)) => Ok(Some((
            Uuid::parse_str(&room_id)?,
            Uuid::parse_str(&sender_id)?,
        ))),
        None => Ok(None),
    }
}

pub async fn apply_edit(
    pool: &SqlitePool,
    message_id: Uuid,
    content: &str,
    edited_at: OffsetDateTime,
) -> AppResult<()> {
    sqlx::query("UPDATE messages SET content=?, edited=1, edited_at=? WHERE id=?")
        .bind(content)
        .bind(edited_at)
        .bind(message_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Records a read receipt. Re-marking an already-read message is a no-op;
/// returns whether a receipt was newly created.
pub async fn insert_receipt(
    pool: &SqlitePool,
    user_id: Uuid,
    message_id: Uuid,
    read_at: OffsetDateTime,
) -> AppResult<bool> {
    let result = sqlx::query(
        "INSERT INTO read_receipts (user_id,message_id,read_at) VALUES (?,?,?) \
         ON CONFLICT (user_id,message_id) DO NOTHING",
    )
    .bind(user_id.to_string())
    .bind(message_id.to_string())
    .bind(read_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn touch_last_read(
    pool: &SqlitePool,
    user_id: Uuid,
    room_id: Uuid,
    read_at: OffsetDateTime,
) -> AppResult<()> {
    sqlx::query("UPDATE members SET last_read=? WHERE user_id=? AND room_id=?")
        .bind(read_at)
        .bind(user_id.to_string())
        .bind(room_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Informational online flag plus last-active stamp. Upserts so a user the
/// identity subsystem hasn't materialized yet still gets tracked.
pub async fn set_online(pool: &SqlitePool, user_id: Uuid, online: bool) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO users (id,username,is_online,last_active) VALUES (?,?,?,?) \
         ON CONFLICT (id) DO UPDATE SET is_online=excluded.is_online, last_active=excluded.last_active",
    )
    .bind(user_id.to_string())
    .bind(placeholder_username(user_id))
    .bind(online)
    .bind(OffsetDateTime::now_utc())
    .execute(pool)
    .await?;
    Ok(())
}
