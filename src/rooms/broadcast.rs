use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::events::ServerEvent;
use crate::registry::ConnectionSender;

struct Subscriber {
    user_id: Uuid,
    tx: ConnectionSender,
}

/// Room id → subscribed connections. Delivery is fire-and-forget and
/// at-most-once per currently-connected recipient: a connection that is
/// gone mid-delivery just misses the event. Events sent sequentially by
/// one task reach each recipient in order (the per-connection channel
/// preserves sender order); nothing is promised across concurrent senders
/// beyond the store's own append order.
#[derive(Clone, Default)]
pub struct BroadcastRouter(Arc<DashMap<Uuid, HashMap<Uuid, Subscriber>>>);

impl BroadcastRouter {
    pub fn subscribe(&self, room_id: Uuid, conn_id: Uuid, user_id: Uuid, tx: ConnectionSender) {
        self.0
            .entry(room_id)
            .or_default()
            .insert(conn_id, Subscriber { user_id, tx });
    }

    pub fn unsubscribe(&self, room_id: Uuid, conn_id: Uuid) {
        if let Some(mut subs) = self.0.get_mut(&room_id) {
            subs.remove(&conn_id);
        }
    }

    /// Drops every connection of one user from a room. Used on leave and on
    /// membership revocation, which must stop deliveries immediately rather
    /// than waiting for the user's next authorized operation.
    pub fn unsubscribe_user(&self, room_id: Uuid, user_id: Uuid) {
        if let Some(mut subs) = self.0.get_mut(&room_id) {
            subs.retain(|_, sub| sub.user_id != user_id);
        }
    }

    /// Sweeps a closed connection out of every room it was subscribed to.
    pub fn drop_connection(&self, conn_id: Uuid) {
        for mut subs in self.0.iter_mut() {
            subs.value_mut().remove(&conn_id);
        }
    }

    /// Delivers `event` to every connection subscribed to the room,
    /// skipping all of `exclude_user`'s connections when given. The event
    /// is serialized once and the frame shared across recipients.
    pub fn broadcast(&self, room_id: Uuid, event: &ServerEvent, exclude_user: Option<Uuid>) {
        let Some(msg) = event.to_ws_message() else {
            return;
        };
        let Some(subs) = self.0.get(&room_id) else {
            return;
        };
        for sub in subs.values() {
            if exclude_user == Some(sub.user_id) {
                continue;
            }
            let _ = sub.tx.send(msg.clone());
        }
    }

    pub fn subscriber_count(&self, room_id: Uuid) -> usize {
        self.0.get(&room_id).map(|subs| subs.len()).unwrap_or(0)
    }
}
