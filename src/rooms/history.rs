use std::time::Duration;

use axum::{
    Json, debug_handler,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppError, AppResult, AppState, cache, db, session};

use super::membership;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Paginated views tolerate brief staleness, not indefinite staleness.
const HISTORY_TTL: Duration = Duration::from_secs(300);

/// Reads fail open on the cache: a slow or broken cache degrades to direct
/// store access instead of failing the request.
const CACHE_CALL_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    pub items: Vec<db::Message>,
    pub total_count: i64,
    pub page: u32,
    pub page_size: u32,
}

/// Read-through history fetch. Cache keys fold in the room's current
/// invalidation token, so a page cached before the latest send can never
/// be served after it.
pub async fn recent_messages(
    state: &AppState,
    user_id: Uuid,
    room_id: Uuid,
    page: u32,
    page_size: u32,
) -> AppResult<HistoryPage> {
    let page = page.max(1);
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);

    if !membership::is_member(&state.db_pool, user_id, room_id).await? {
        return Err(AppError::Forbidden);
    }

    let key = cache::history_key(room_id, state.versions.current(room_id), page, page_size);

    match timeout(CACHE_CALL_TIMEOUT, state.cache.get(&key)).await {
        Ok(Ok(Some(bytes))) => match serde_json::from_slice::<HistoryPage>(&bytes) {
            Ok(cached) => return Ok(cached),
            Err(err) => {
                tracing::warn!(error = %err, key, "dropping undecodable cache entry");
                if let Ok(Err(err)) = timeout(CACHE_CALL_TIMEOUT, state.cache.remove(&key)).await {
                    tracing::warn!(error = %err, key, "cache remove failed");
                }
            }
        },
        Ok(Ok(None)) => {}
        Ok(Err(err)) => tracing::warn!(error = %err, "cache read failed, going to store"),
        Err(_) => tracing::warn!("cache read timed out, going to store"),
    }

    let (items, total_count) = read_page_with_retry(room_id, || {
        db::page_messages(&state.db_pool, room_id, page, page_size)
    })
    .await?;

    let result = HistoryPage {
        items,
        total_count,
        page,
        page_size,
    };

    if let Ok(bytes) = serde_json::to_vec(&result) {
        match timeout(CACHE_CALL_TIMEOUT, state.cache.set(&key, bytes, HISTORY_TTL)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(error = %err, "cache populate failed"),
            Err(_) => tracing::warn!("cache populate timed out"),
        }
    }

    Ok(result)
}

/// One retry before surfacing a store read failure.
async fn read_page_with_retry<F, Fut>(room_id: Uuid, read: F) -> AppResult<(Vec<db::Message>, i64)>
where
    F: Fn() -> Fut,
    Fut: Future<Output = AppResult<(Vec<db::Message>, i64)>>,
{
    match read().await {
        Ok(result) => Ok(result),
        Err(err) => {
            tracing::warn!(error = %err, %room_id, "store read failed, retrying once");
            read().await
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct HistoryQuery {
    page: Option<u32>,
    size: Option<u32>,
}

#[debug_handler]
pub(crate) async fn recent_messages_handler(
    State(state): State<AppState>,
    session: Session,
    Path(room_id): Path<Uuid>,
    Query(HistoryQuery { page, size }): Query<HistoryQuery>,
) -> AppResult<Json<HistoryPage>> {
    let user_id = session::current_user_id(&session).await?;
    Ok(Json(
        recent_messages(
            &state,
            user_id,
            room_id,
            page.unwrap_or(1),
            size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?,
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn a_failed_store_read_is_retried_once() {
        let calls = AtomicUsize::new(0);

        let (items, total) = read_page_with_retry(Uuid::now_v7(), || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AppError::Store(sqlx::Error::PoolClosed))
            } else {
                Ok((Vec::new(), 7))
            }
        })
        .await
        .unwrap();

        assert!(items.is_empty());
        assert_eq!(total, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn a_second_store_failure_surfaces() {
        let calls = AtomicUsize::new(0);

        let result: AppResult<(Vec<db::Message>, i64)> =
            read_page_with_retry(Uuid::now_v7(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Store(sqlx::Error::PoolClosed))
            })
            .await;

        assert!(matches!(result, Err(AppError::Store(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
