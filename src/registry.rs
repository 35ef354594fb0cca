use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::events::ServerEvent;

/// Handle for pushing frames at one live connection. The receiving half is
/// owned by that connection's writer task; when the connection goes away
/// sends simply fail and are ignored.
pub type ConnectionSender = mpsc::UnboundedSender<ws::Message>;

/// User id → that user's open connections. A user with several devices or
/// tabs holds several entries, and every operation that targets "a user"
/// fans out over all of them. Sharded locking via DashMap keeps concurrent
/// connects/disconnects off a global lock.
#[derive(Clone, Default)]
pub struct ConnectionRegistry(Arc<DashMap<Uuid, HashMap<Uuid, ConnectionSender>>>);

impl ConnectionRegistry {
    pub fn add(&self, user_id: Uuid, conn_id: Uuid, tx: ConnectionSender) {
        self.0.entry(user_id).or_default().insert(conn_id, tx);
    }

    /// Removes one connection. Removing a connection that is not present is
    /// a no-op. Returns true when this was the user's last connection, the
    /// trigger for marking them offline.
    pub fn remove(&self, user_id: Uuid, conn_id: Uuid) -> bool {
        let Some(mut conns) = self.0.get_mut(&user_id) else {
            return false;
        };
        conns.remove(&conn_id);
        let last = conns.is_empty();
        drop(conns);
        if last {
            self.0.remove_if(&user_id, |_, conns| conns.is_empty());
        }
        last
    }

    pub fn connections_for(&self, user_id: Uuid) -> Vec<Uuid> {
        self.0
            .get(&user_id)
            .map(|conns| conns.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Current senders for every one of the user's connections, for callers
    /// that need to fan a subscription out across all of them.
    pub fn senders_for(&self, user_id: Uuid) -> Vec<(Uuid, ConnectionSender)> {
        self.0
            .get(&user_id)
            .map(|conns| {
                conns
                    .iter()
                    .map(|(conn_id, tx)| (*conn_id, tx.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Delivers an event to every connection of one user. Fire-and-forget:
    /// a user with zero connections receives nothing and that is not an
    /// error.
    pub fn send_to_user(&self, user_id: Uuid, event: &ServerEvent) {
        let Some(msg) = event.to_ws_message() else {
            return;
        };
        if let Some(conns) = self.0.get(&user_id) {
            for tx in conns.values() {
                let _ = tx.send(msg.clone());
            }
        }
    }
}
