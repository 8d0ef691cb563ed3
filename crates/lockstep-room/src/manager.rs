//! Room manager: creates, tracks, and closes rooms.

use std::collections::HashMap;
use std::sync::Arc;

use lockstep_protocol::RoomId;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::{BattleConfig, Room, RoomError, RoomSlot};

/// Owns every room, keyed by id.
///
/// Room ids are `room_id_base + n` for the n-th room created, starting at
/// 1, and are never reused. Closed rooms stay addressable until
/// [`reclaim_closed`](Self::reclaim_closed) removes them.
#[derive(Debug)]
pub struct RoomManager {
    room_id_base: u32,
    config: BattleConfig,
    inner: RwLock<Inner>,
    /// Parent of every room's tick token.
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct Inner {
    rooms: HashMap<RoomId, Arc<RoomSlot>>,
    created: u32,
}

impl RoomManager {
    /// Creates a manager with no rooms.
    pub fn new(room_id_base: u32, config: BattleConfig) -> Self {
        Self {
            room_id_base,
            config: config.validated(),
            inner: RwLock::new(Inner::default()),
            cancel: CancellationToken::new(),
        }
    }

    /// The settings every new room gets.
    pub fn config(&self) -> &BattleConfig {
        &self.config
    }

    /// Creates an empty room and returns its id.
    pub fn create(&self) -> RoomId {
        let mut inner = self.inner.write();
        inner.created += 1;
        let room_id = RoomId(self.room_id_base + inner.created);
        let room = Room::new(room_id, self.config.clone());
        let slot = RoomSlot::new(room, self.cancel.child_token());
        inner.rooms.insert(room_id, Arc::new(slot));
        tracing::info!(%room_id, rooms = inner.rooms.len(), "room created");
        room_id
    }

    /// Looks up a room.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] if `room_id` was never created or has been
    /// reclaimed.
    pub fn get(&self, room_id: RoomId) -> Result<Arc<RoomSlot>, RoomError> {
        self.inner
            .read()
            .rooms
            .get(&room_id)
            .cloned()
            .ok_or(RoomError::NotFound(room_id))
    }

    /// Closes a room and stops its tick task. The room stays addressable.
    pub fn close(&self, room_id: RoomId) -> Result<(), RoomError> {
        self.get(room_id)?.close();
        Ok(())
    }

    /// Drops every closed room. Returns how many were removed.
    pub fn reclaim_closed(&self) -> usize {
        let mut inner = self.inner.write();
        let before = inner.rooms.len();
        inner.rooms.retain(|_, slot| !slot.is_stopped());
        let removed = before - inner.rooms.len();
        if removed > 0 {
            tracing::debug!(removed, rooms = inner.rooms.len(), "closed rooms reclaimed");
        }
        removed
    }

    /// Number of rooms currently tracked.
    pub fn room_count(&self) -> usize {
        self.inner.read().rooms.len()
    }

    /// Ids of every tracked room, ascending.
    pub fn room_ids(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self.inner.read().rooms.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Closes every room and stops all tick tasks.
    pub fn shutdown(&self) {
        let slots: Vec<Arc<RoomSlot>> = self.inner.read().rooms.values().cloned().collect();
        for slot in &slots {
            slot.close();
        }
        self.cancel.cancel();
        tracing::info!(rooms = slots.len(), "room manager shut down");
    }
}
