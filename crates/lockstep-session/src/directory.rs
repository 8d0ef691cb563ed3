//! The player directory: who is who, and how to reach them.
//!
//! Each logged-in player has one [`PlayerRecord`] holding its account, its
//! lobby and battle connections (either may be absent), and the room it
//! belongs to. Three indexes keep lookups O(1):
//!
//! - account → player (so a second login reuses the id)
//! - lobby connection → player
//! - battle connection → player
//!
//! # Concurrency note
//!
//! `SessionDirectory` is a plain set of `HashMap`s. The server wraps it in
//! one mutex shared by the lobby and battle handlers.

use std::collections::HashMap;

use lockstep_protocol::{PlayerId, RoomId};
use lockstep_transport::ConnectionId;

use crate::SessionError;

/// Id allocation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryConfig {
    /// The first player gets `player_id_base + 1`.
    pub player_id_base: u32,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            player_id_base: 100,
        }
    }
}

/// Everything the server knows about one player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub account: String,
    /// Current lobby connection, if the lobby stream is open.
    pub lobby: Option<ConnectionId>,
    /// Current battle connection, set by the battle `Connect` command.
    pub battle: Option<ConnectionId>,
    /// The room this player has joined.
    pub room: Option<RoomId>,
}

/// Result of [`SessionDirectory::login`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginOutcome {
    pub player_id: PlayerId,
    /// `false` when the account already had an id.
    pub created: bool,
}

/// Lookup tables for player identity. See the module docs.
#[derive(Debug, Default)]
pub struct SessionDirectory {
    config: DirectoryConfig,
    players: HashMap<PlayerId, PlayerRecord>,
    accounts: HashMap<String, PlayerId>,
    lobby_conns: HashMap<ConnectionId, PlayerId>,
    battle_conns: HashMap<ConnectionId, PlayerId>,
}

impl SessionDirectory {
    pub fn new(config: DirectoryConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Logs `account` in on lobby connection `conn`.
    ///
    /// A new account gets the next id (`base + count + 1`). A known account
    /// keeps its id and is rebound to `conn`; the previous lobby connection
    /// stops resolving to it.
    pub fn login(&mut self, account: &str, conn: ConnectionId) -> LoginOutcome {
        let (player_id, created) = match self.accounts.get(account) {
            Some(&id) => (id, false),
            None => {
                let id = PlayerId(self.config.player_id_base + self.players.len() as u32 + 1);
                self.accounts.insert(account.to_owned(), id);
                self.players.insert(
                    id,
                    PlayerRecord {
                        id,
                        account: account.to_owned(),
                        lobby: None,
                        battle: None,
                        room: None,
                    },
                );
                (id, true)
            }
        };

        // A connection can only speak for one player.
        if let Some(previous) = self.lobby_conns.insert(conn, player_id) {
            if previous != player_id {
                if let Some(record) = self.players.get_mut(&previous) {
                    record.lobby = None;
                }
            }
        }
        if let Some(record) = self.players.get_mut(&player_id) {
            if let Some(old) = record.lobby.replace(conn) {
                if old != conn {
                    self.lobby_conns.remove(&old);
                }
            }
        }

        if created {
            tracing::info!(%player_id, account, %conn, "player registered");
        } else {
            tracing::info!(%player_id, account, %conn, "player logged in again");
        }
        LoginOutcome { player_id, created }
    }

    pub fn get(&self, id: PlayerId) -> Option<&PlayerRecord> {
        self.players.get(&id)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    /// Number of registered players.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn player_by_account(&self, account: &str) -> Option<PlayerId> {
        self.accounts.get(account).copied()
    }

    pub fn player_by_lobby(&self, conn: ConnectionId) -> Option<PlayerId> {
        self.lobby_conns.get(&conn).copied()
    }

    pub fn player_by_battle(&self, conn: ConnectionId) -> Option<PlayerId> {
        self.battle_conns.get(&conn).copied()
    }

    /// Binds `conn` as `player`'s battle connection, replacing any earlier
    /// one. Returns the replaced connection.
    ///
    /// # Errors
    /// [`SessionError::PlayerNotFound`] if `player` never logged in.
    pub fn bind_battle(
        &mut self,
        player: PlayerId,
        conn: ConnectionId,
    ) -> Result<Option<ConnectionId>, SessionError> {
        let record = self
            .players
            .get_mut(&player)
            .ok_or(SessionError::PlayerNotFound(player))?;
        let previous = record.battle.replace(conn);
        if let Some(old) = previous {
            self.battle_conns.remove(&old);
        }
        // The connection may have spoken for someone else before.
        if let Some(other) = self.battle_conns.insert(conn, player) {
            if other != player {
                if let Some(other_record) = self.players.get_mut(&other) {
                    other_record.battle = None;
                }
            }
        }
        tracing::debug!(%player, %conn, "battle connection bound");
        Ok(previous.filter(|old| *old != conn))
    }

    /// Forgets lobby connection `conn`. Returns the player it belonged to.
    pub fn unbind_lobby(&mut self, conn: ConnectionId) -> Option<PlayerId> {
        let player = self.lobby_conns.remove(&conn)?;
        if let Some(record) = self.players.get_mut(&player) {
            record.lobby = None;
        }
        Some(player)
    }

    /// Forgets battle connection `conn`. Returns the player it belonged to.
    pub fn unbind_battle(&mut self, conn: ConnectionId) -> Option<PlayerId> {
        let player = self.battle_conns.remove(&conn)?;
        if let Some(record) = self.players.get_mut(&player) {
            record.battle = None;
        }
        Some(player)
    }

    /// Records which room `player` is in.
    ///
    /// # Errors
    /// [`SessionError::PlayerNotFound`] if `player` never logged in.
    pub fn set_room(&mut self, player: PlayerId, room: Option<RoomId>) -> Result<(), SessionError> {
        let record = self
            .players
            .get_mut(&player)
            .ok_or(SessionError::PlayerNotFound(player))?;
        record.room = room;
        Ok(())
    }

    pub fn room_of(&self, player: PlayerId) -> Option<RoomId> {
        self.players.get(&player).and_then(|record| record.room)
    }

    pub fn battle_conn(&self, player: PlayerId) -> Option<ConnectionId> {
        self.players.get(&player).and_then(|record| record.battle)
    }

    /// Every open lobby connection that belongs to a logged-in player.
    pub fn lobby_connections(&self) -> Vec<ConnectionId> {
        self.lobby_conns.keys().copied().collect()
    }
}
