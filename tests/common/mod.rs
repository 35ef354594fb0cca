#![allow(dead_code)]

use std::sync::Arc;

use axum::extract::ws;
use parlor::cache::{Cache, MemoryCache};
use parlor::rooms::{membership, ws as connection};
use parlor::{AppState, ChatConfig, db};
use sqlx::sqlite::SqlitePoolOptions;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Fresh isolated state over an in-memory SQLite store. A single pool
/// connection keeps every query on the same in-memory database.
pub async fn state_with(config: ChatConfig) -> AppState {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::apply_schema(&pool).await.unwrap();
    AppState::new(pool, Arc::new(MemoryCache::default()), config)
}

pub async fn test_state() -> AppState {
    state_with(ChatConfig::default()).await
}

/// Same store setup, custom cache backend.
pub async fn state_with_cache(cache: Arc<dyn Cache>) -> AppState {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::apply_schema(&pool).await.unwrap();
    AppState::new(pool, cache, ChatConfig::default())
}

pub async fn seed_user(state: &AppState, username: &str) -> Uuid {
    let id = Uuid::now_v7();
    sqlx::query("INSERT INTO users (id,username,is_online) VALUES (?,?,0)")
        .bind(id.to_string())
        .bind(username)
        .execute(&state.db_pool)
        .await
        .unwrap();
    id
}

pub async fn seed_room(state: &AppState, owner_id: Uuid, name: &str, is_private: bool) -> Uuid {
    let id = Uuid::now_v7();
    sqlx::query("INSERT INTO rooms (id,name,is_private,owner_id,created_at) VALUES (?,?,?,?,?)")
        .bind(id.to_string())
        .bind(name)
        .bind(is_private)
        .bind(owner_id.to_string())
        .bind(OffsetDateTime::now_utc())
        .execute(&state.db_pool)
        .await
        .unwrap();
    membership::add_member(&state.db_pool, owner_id, id, true)
        .await
        .unwrap();
    id
}

/// Stands in for an open WebSocket: the live connection is just its sender
/// half, so tests read delivered frames straight off the receiver.
pub async fn connect(state: &AppState, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<ws::Message>) {
    let conn_id = Uuid::now_v7();
    let (tx, rx) = mpsc::unbounded_channel();
    connection::attach_connection(state, user_id, conn_id, tx).await;
    (conn_id, rx)
}

/// Everything delivered so far, parsed back out of the JSON text frames.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ws::Message>) -> Vec<serde_json::Value> {
    let mut events = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        if let ws::Message::Text(text) = frame {
            events.push(serde_json::from_str(&text).unwrap());
        }
    }
    events
}

pub async fn message_count(state: &AppState, room_id: Uuid) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE room_id=?")
        .bind(room_id.to_string())
        .fetch_one(&state.db_pool)
        .await
        .unwrap();
    count
}

pub async fn receipt_count(state: &AppState, message_id: Uuid) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM read_receipts WHERE message_id=?")
        .bind(message_id.to_string())
        .fetch_one(&state.db_pool)
        .await
        .unwrap();
    count
}
