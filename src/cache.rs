use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AppResult;

/// Key/value cache with expiry. Strictly a derived accelerator over the
/// store: any entry may vanish at any time without correctness loss.
/// Failures map to `AppError::Cache`, which callers absorb.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> AppResult<()>;
    async fn remove(&self, key: &str) -> AppResult<()>;
}

struct Entry {
    bytes: Vec<u8>,
    expires_at: OffsetDateTime,
}

/// In-process cache. The trait seam is where a networked cache (Redis and
/// friends) would plug in; this implementation keeps entries in a DashMap
/// and drops expired ones lazily on read and on every write.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        let now = OffsetDateTime::now_utc();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.bytes.clone()));
            }
        }
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> AppResult<()> {
        let now = OffsetDateTime::now_utc();
        // Writes double as the reap point. Keys orphaned by a token bump
        // are never read again, so a get-side reap alone would let them
        // pile up for the life of the process.
        self.entries.retain(|_, entry| entry.expires_at > now);
        let expires_at = now + ttl;
        self.entries.insert(
            key.to_owned(),
            Entry {
                bytes: value,
                expires_at,
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Per-room invalidation tokens. A new message can sit under any number of
/// `(page, size)` cache entries, so instead of enumerating them every key
/// folds in the room's current token and a write simply bumps it, orphaning
/// every older entry until its TTL reaps it.
#[derive(Clone, Default)]
pub struct RoomVersions(Arc<DashMap<Uuid, u64>>);

impl RoomVersions {
    pub fn current(&self, room_id: Uuid) -> u64 {
        self.0.get(&room_id).map(|v| *v).unwrap_or(0)
    }

    pub fn bump(&self, room_id: Uuid) {
        *self.0.entry(room_id).or_insert(0) += 1;
    }
}

pub fn history_key(room_id: Uuid, version: u64, page: u32, page_size: u32) -> String {
    format!("room:{room_id}:v{version}:page:{page}:size:{page_size}")
}
