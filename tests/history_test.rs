//! Paginated history: ordering, boundaries, cache population and
//! membership gating.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use parlor::rooms::{history, msg};
use parlor::cache::{self, Cache};
use parlor::{AppError, AppResult};

/// Stands in for an unreachable cache backend: every call fails.
struct DownCache;

#[async_trait::async_trait]
impl Cache for DownCache {
    async fn get(&self, _key: &str) -> AppResult<Option<Vec<u8>>> {
        Err(AppError::Cache("backend unreachable".to_owned()))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> AppResult<()> {
        Err(AppError::Cache("backend unreachable".to_owned()))
    }

    async fn remove(&self, _key: &str) -> AppResult<()> {
        Err(AppError::Cache("backend unreachable".to_owned()))
    }
}

#[tokio::test]
async fn pages_are_newest_first_with_the_full_count() {
    let state = test_state().await;
    let alice = seed_user(&state, "alice").await;
    let room = seed_room(&state, alice, "general", false).await;

    for n in 1..=5 {
        msg::send_message(&state, alice, room, &format!("msg {n}"))
            .await
            .unwrap();
    }

    let first = history::recent_messages(&state, alice, room, 1, 2)
        .await
        .unwrap();
    assert_eq!(first.total_count, 5);
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.items[0].content, "msg 5");
    assert_eq!(first.items[1].content, "msg 4");

    let last = history::recent_messages(&state, alice, room, 3, 2)
        .await
        .unwrap();
    assert_eq!(last.total_count, 5);
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.items[0].content, "msg 1");
}

#[tokio::test]
async fn a_read_populates_the_cache_under_the_current_token() {
    let state = test_state().await;
    let alice = seed_user(&state, "alice").await;
    let room = seed_room(&state, alice, "general", false).await;
    msg::send_message(&state, alice, room, "hello").await.unwrap();

    history::recent_messages(&state, alice, room, 1, 10)
        .await
        .unwrap();

    let key = cache::history_key(room, state.versions.current(room), 1, 10);
    assert!(state.cache.get(&key).await.unwrap().is_some());
}

#[tokio::test]
async fn a_send_bumps_the_token_and_orphans_old_pages() {
    let state = test_state().await;
    let alice = seed_user(&state, "alice").await;
    let room = seed_room(&state, alice, "general", false).await;

    msg::send_message(&state, alice, room, "one").await.unwrap();
    history::recent_messages(&state, alice, room, 1, 10)
        .await
        .unwrap();
    let stale_key = cache::history_key(room, state.versions.current(room), 1, 10);

    msg::send_message(&state, alice, room, "two").await.unwrap();

    // the old entry still exists but no current key will ever reach it
    assert!(state.cache.get(&stale_key).await.unwrap().is_some());
    assert_ne!(
        stale_key,
        cache::history_key(room, state.versions.current(room), 1, 10)
    );
}

#[tokio::test]
async fn a_failing_cache_degrades_to_direct_store_reads() {
    let state = state_with_cache(Arc::new(DownCache)).await;
    let alice = seed_user(&state, "alice").await;
    let room = seed_room(&state, alice, "general", false).await;
    msg::send_message(&state, alice, room, "hello").await.unwrap();

    // both the read and the populate fail; the page still comes back
    let page = history::recent_messages(&state, alice, room, 1, 10)
        .await
        .unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(page.items[0].content, "hello");
}

#[tokio::test]
async fn history_is_membership_gated() {
    let state = test_state().await;
    let alice = seed_user(&state, "alice").await;
    let mallory = seed_user(&state, "mallory").await;
    let room = seed_room(&state, alice, "general", false).await;

    let result = history::recent_messages(&state, mallory, room, 1, 10).await;
    assert!(matches!(result, Err(AppError::Forbidden)));
}

#[tokio::test]
async fn page_and_size_are_clamped_to_sane_bounds() {
    let state = test_state().await;
    let alice = seed_user(&state, "alice").await;
    let room = seed_room(&state, alice, "general", false).await;
    msg::send_message(&state, alice, room, "hello").await.unwrap();

    // page 0 behaves as page 1, oversized pages are capped
    let page = history::recent_messages(&state, alice, room, 0, 10_000)
        .await
        .unwrap();
    assert_eq!(page.page, 1);
    assert_eq!(page.page_size, history::MAX_PAGE_SIZE);
    assert_eq!(page.items.len(), 1);
}
