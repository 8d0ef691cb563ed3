//! State shared by the lobby and battle services.

use std::sync::Arc;

use lockstep_protocol::Codec;
use lockstep_room::RoomManager;
use lockstep_session::{Authenticator, SessionDirectory};
use parking_lot::Mutex;

use crate::ServerConfig;

/// The directory, the rooms, and the codec, built once at startup and
/// handed to both services.
///
/// Lock order: never hold the directory lock while locking a room, and
/// never send while holding either.
pub struct ServerState<A: Authenticator, C: Codec> {
    pub directory: Mutex<SessionDirectory>,
    pub rooms: Arc<RoomManager>,
    pub auth: A,
    pub codec: Arc<C>,
}

impl<A: Authenticator, C: Codec> ServerState<A, C> {
    pub fn new(config: &ServerConfig, auth: A, codec: C) -> Self {
        Self {
            directory: Mutex::new(SessionDirectory::new(config.directory())),
            rooms: Arc::new(RoomManager::new(config.room_id_base, config.battle.clone())),
            auth,
            codec: Arc::new(codec),
        }
    }
}
