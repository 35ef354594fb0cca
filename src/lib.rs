pub mod appresult;
pub mod cache;
pub mod db;
pub mod events;
pub mod registry;
pub mod res;
pub mod rooms;
pub mod session;

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::SqlitePool;

pub use appresult::{AppError, AppResult};

use cache::{Cache, RoomVersions};
use registry::ConnectionRegistry;
use rooms::broadcast::BroadcastRouter;
use rooms::typing::TypingTracker;

/// Process-wide knobs for the distribution subsystem.
#[derive(Clone, Default)]
pub struct ChatConfig {
    /// When true, `message.received` is echoed back to every connection of
    /// the sender as well. When false the sender's connections are skipped.
    pub echo_to_sender: bool,
}

/// Everything a handler needs, constructed once in main (or per test) and
/// handed to axum. No ambient globals; tests build as many isolated
/// instances as they like.
#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub cache: Arc<dyn Cache>,
    pub versions: RoomVersions,
    pub registry: ConnectionRegistry,
    pub router: BroadcastRouter,
    pub typing: TypingTracker,
    pub config: ChatConfig,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, cache: Arc<dyn Cache>, config: ChatConfig) -> Self {
        Self {
            db_pool,
            cache,
            versions: RoomVersions::default(),
            registry: ConnectionRegistry::default(),
            router: BroadcastRouter::default(),
            typing: TypingTracker::default(),
            config,
        }
    }
}
