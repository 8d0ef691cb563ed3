//! Lobby commands: login, create room, join room.
//!
//! Runs on the lobby transport's reader tasks. Replies go to the sender;
//! room creation and successful joins go to every logged-in lobby
//! connection so all clients see the room list change.

use std::net::SocketAddr;
use std::sync::Arc;

use lockstep_protocol::{
    Codec, CreateRoomReply, CreateRoomRequest, JoinRoomReply, JoinRoomRequest, LobbyCommand,
    LobbyErrorCode, LoginReply, LoginRequest, PlayerId, ProtocolError, RoomId,
};
use lockstep_room::{JoinOutcome, RoomState};
use lockstep_session::Authenticator;
use lockstep_transport::{ConnectionId, PacketHandler, PacketSink, TransportError};
use serde::Serialize;

use crate::ServerState;

/// The battle listener as seen from the lobby: started on demand when the
/// first room fills up.
pub trait BattleEndpoint: Send + Sync + 'static {
    fn is_active(&self) -> bool;

    /// Starts the listener. Must be a no-op if it is already running.
    fn start(&self) -> Result<SocketAddr, TransportError>;
}

/// [`PacketHandler`] for the lobby channel.
pub struct LobbyService<A: Authenticator, C: Codec, S: PacketSink, E: BattleEndpoint> {
    state: Arc<ServerState<A, C>>,
    sink: Arc<S>,
    battle: Arc<E>,
}

impl<A, C, S, E> LobbyService<A, C, S, E>
where
    A: Authenticator,
    C: Codec,
    S: PacketSink,
    E: BattleEndpoint,
{
    pub fn new(state: Arc<ServerState<A, C>>, sink: Arc<S>, battle: Arc<E>) -> Self {
        Self { state, sink, battle }
    }

    fn login(&self, conn: ConnectionId, payload: &[u8]) -> Result<(), ProtocolError> {
        let request: LoginRequest = self.state.codec.decode(payload)?;
        tracing::debug!(%conn, account = %request.account, "login request");

        let reply = match self.state.auth.authenticate(&request.account, &request.password) {
            Ok(()) => {
                let outcome = self.state.directory.lock().login(&request.account, conn);
                LoginReply {
                    error_code: LobbyErrorCode::Ok,
                    player_id: outcome.player_id,
                }
            }
            Err(error) => {
                tracing::warn!(%conn, account = %request.account, %error, "login refused");
                LoginReply {
                    error_code: LobbyErrorCode::AuthFailed,
                    player_id: PlayerId(0),
                }
            }
        };
        self.send(conn, LobbyCommand::Login, &reply)
    }

    fn create_room(&self, conn: ConnectionId, payload: &[u8]) -> Result<(), ProtocolError> {
        let request: CreateRoomRequest = self.state.codec.decode(payload)?;
        tracing::debug!(%conn, player = %request.player_id, "create room request");

        if !self.state.directory.lock().contains(request.player_id) {
            let reply = CreateRoomReply {
                error_code: LobbyErrorCode::PlayerNotFound,
                room_id: RoomId(0),
            };
            return self.send(conn, LobbyCommand::CreateRoom, &reply);
        }

        self.state.rooms.reclaim_closed();
        let room_id = self.state.rooms.create();
        let reply = CreateRoomReply {
            error_code: LobbyErrorCode::Ok,
            room_id,
        };
        self.broadcast(LobbyCommand::CreateRoom, &reply)
    }

    fn join_room(&self, conn: ConnectionId, payload: &[u8]) -> Result<(), ProtocolError> {
        let request: JoinRoomRequest = self.state.codec.decode(payload)?;
        tracing::debug!(
            %conn,
            player = %request.player_id,
            room_id = %request.room_id,
            "join room request"
        );

        match self.try_join(request.player_id, request.room_id) {
            Ok(outcome) => {
                let full = outcome.members.len() >= self.state.rooms.config().max_players;
                let reply = JoinRoomReply {
                    error_code: LobbyErrorCode::Ok,
                    room_id: request.room_id,
                    members: outcome.members,
                };
                self.broadcast(LobbyCommand::JoinRoom, &reply)?;
                if full {
                    self.ensure_battle_started();
                }
                Ok(())
            }
            Err(error_code) => {
                tracing::debug!(
                    %conn,
                    player = %request.player_id,
                    room_id = %request.room_id,
                    ?error_code,
                    "join refused"
                );
                let reply = JoinRoomReply {
                    error_code,
                    room_id: request.room_id,
                    members: Vec::new(),
                };
                self.send(conn, LobbyCommand::JoinRoom, &reply)
            }
        }
    }

    fn try_join(&self, player: PlayerId, room_id: RoomId) -> Result<JoinOutcome, LobbyErrorCode> {
        let current = {
            let directory = self.state.directory.lock();
            if !directory.contains(player) {
                return Err(LobbyErrorCode::PlayerNotFound);
            }
            directory.room_of(player)
        };

        // One room at a time, unless the old one has closed.
        if let Some(current) = current.filter(|r| *r != room_id) {
            let still_open = self
                .state
                .rooms
                .get(current)
                .is_ok_and(|slot| slot.lock().state() != RoomState::Closed);
            if still_open {
                return Err(LobbyErrorCode::AlreadyInRoom);
            }
        }

        let slot = self.state.rooms.get(room_id).map_err(|e| e.lobby_code())?;
        let outcome = slot.lock().join(player).map_err(|e| e.lobby_code())?;
        self.state
            .directory
            .lock()
            .set_room(player, Some(room_id))
            .map_err(|_| LobbyErrorCode::PlayerNotFound)?;
        Ok(outcome)
    }

    fn ensure_battle_started(&self) {
        if self.battle.is_active() {
            return;
        }
        match self.battle.start() {
            Ok(addr) => tracing::info!(%addr, "battle transport started"),
            Err(error) => tracing::error!(%error, "battle transport failed to start"),
        }
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    fn send<T: Serialize>(
        &self,
        conn: ConnectionId,
        cmd: LobbyCommand,
        body: &T,
    ) -> Result<(), ProtocolError> {
        let payload = self.state.codec.encode(body)?;
        if let Err(error) = self.sink.send_packet(conn, cmd.into(), &payload) {
            tracing::debug!(%conn, ?cmd, %error, "lobby reply not delivered");
        }
        Ok(())
    }

    fn broadcast<T: Serialize>(&self, cmd: LobbyCommand, body: &T) -> Result<(), ProtocolError> {
        let payload = self.state.codec.encode(body)?;
        let conns = self.state.directory.lock().lobby_connections();
        for conn in &conns {
            if let Err(error) = self.sink.send_packet(*conn, cmd.into(), &payload) {
                tracing::debug!(%conn, ?cmd, %error, "lobby broadcast not delivered");
            }
        }
        tracing::debug!(?cmd, recipients = conns.len(), "lobby broadcast");
        Ok(())
    }
}

impl<A, C, S, E> PacketHandler for LobbyService<A, C, S, E>
where
    A: Authenticator,
    C: Codec,
    S: PacketSink,
    E: BattleEndpoint,
{
    fn on_connected(&self, conn: ConnectionId, addr: SocketAddr) {
        tracing::info!(%conn, %addr, "lobby client connected");
    }

    fn on_packet(&self, conn: ConnectionId, cmd: u8, payload: &[u8]) -> Result<(), ProtocolError> {
        match LobbyCommand::try_from(cmd)? {
            LobbyCommand::Login => self.login(conn, payload),
            LobbyCommand::CreateRoom => self.create_room(conn, payload),
            LobbyCommand::JoinRoom => self.join_room(conn, payload),
        }
    }

    fn on_disconnected(&self, conn: ConnectionId) {
        match self.state.directory.lock().unbind_lobby(conn) {
            Some(player) => tracing::info!(%conn, %player, "lobby client disconnected"),
            None => tracing::debug!(%conn, "anonymous lobby client disconnected"),
        }
    }
}
