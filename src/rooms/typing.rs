use std::sync::Arc;

use dashmap::DashMap;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::events::ServerEvent;
use crate::{AppResult, AppState, db};

use super::membership;

/// How long a typing signal stays visible without a refresh. Carried in the
/// event as an absolute `expires_at` so receivers never need their own
/// clock assumptions.
pub const TYPING_WINDOW: Duration = Duration::seconds(3);

/// Ephemeral `(user, room) → last typed` map. Nothing here is persisted;
/// a newer signal from the same user in the same room supersedes the old
/// one rather than accumulating, and every signal reaps entries that fell
/// out of the window, whatever room they were for.
#[derive(Clone, Default)]
pub struct TypingTracker(Arc<DashMap<(Uuid, Uuid), OffsetDateTime>>);

impl TypingTracker {
    /// Records the signal and returns when it expires. Marking is the one
    /// operation guaranteed to run in a live process, so it carries the
    /// reap of stale entries.
    pub fn mark(&self, user_id: Uuid, room_id: Uuid) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();
        let cutoff = now - TYPING_WINDOW;
        self.0.retain(|_, last_typed| *last_typed > cutoff);
        self.0.insert((user_id, room_id), now);
        now + TYPING_WINDOW
    }

    /// Users currently typing in the room, pruning anything older than the
    /// window along the way.
    pub fn active_in(&self, room_id: Uuid) -> Vec<Uuid> {
        let cutoff = OffsetDateTime::now_utc() - TYPING_WINDOW;
        self.0.retain(|_, last_typed| *last_typed > cutoff);
        self.0
            .iter()
            .filter(|entry| entry.key().1 == room_id)
            .map(|entry| entry.key().0)
            .collect()
    }
}

/// Best-effort by contract: an unauthorized or failed signal is logged and
/// swallowed, never surfaced, since a missing indicator is harmless UX.
pub async fn signal_typing(state: &AppState, user_id: Uuid, room_id: Uuid) -> AppResult<()> {
    match membership::is_member(&state.db_pool, user_id, room_id).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(%user_id, %room_id, "typing signal from non-member ignored");
            return Ok(());
        }
        Err(err) => {
            tracing::warn!(error = %err, "membership check failed for typing signal");
            return Ok(());
        }
    }

    let expires_at = state.typing.mark(user_id, room_id);

    let username = match db::username(&state.db_pool, user_id).await {
        Ok(name) => name,
        Err(err) => {
            tracing::warn!(error = %err, "username lookup failed for typing signal");
            return Ok(());
        }
    };

    state.router.broadcast(
        room_id,
        &ServerEvent::UserTyping {
            user_id,
            username,
            room_id,
            expires_at,
        },
        Some(user_id),
    );
    Ok(())
}
