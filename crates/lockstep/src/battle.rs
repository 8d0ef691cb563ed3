//! Battle commands: connect, ready, heartbeat, frame input, state check.
//!
//! Runs on the battle transport's poll task, so nothing here may block:
//! each command takes the directory or room lock for one short operation
//! and queues its sends after the lock is released.
//!
//! A battle connection speaks for the player it was bound to by
//! `Connect`. `Frame` and `Check` carry no player id; they're attributed
//! through that binding.

use std::net::SocketAddr;
use std::sync::Arc;

use lockstep_protocol::{
    BattleCommand, BattleErrorCode, CheckReply, CheckRequest, Codec, ConnectReply,
    ConnectRequest, FrameInput, HeartbeatReply, HeartbeatRequest, PlayerId, ProtocolError,
    ReadyReply, ReadyRequest,
};
use lockstep_room::RoomSlot;
use lockstep_session::Authenticator;
use lockstep_transport::{ConnectionId, PacketHandler, PacketSink};
use serde::Serialize;

use crate::ServerState;

/// [`PacketHandler`] for the battle channel.
///
/// `sink` carries replies and is also handed to each room's tick task for
/// the per-frame broadcasts.
pub struct BattleService<A: Authenticator, C: Codec, S: PacketSink> {
    state: Arc<ServerState<A, C>>,
    sink: Arc<S>,
}

impl<A, C, S> BattleService<A, C, S>
where
    A: Authenticator,
    C: Codec,
    S: PacketSink,
{
    pub fn new(state: Arc<ServerState<A, C>>, sink: Arc<S>) -> Self {
        Self { state, sink }
    }

    fn connect(&self, conn: ConnectionId, payload: &[u8]) -> Result<(), ProtocolError> {
        let request: ConnectRequest = self.state.codec.decode(payload)?;
        tracing::debug!(
            %conn,
            player = %request.player_id,
            season = request.season_id,
            "connect request"
        );

        let bound = {
            let mut directory = self.state.directory.lock();
            directory
                .bind_battle(request.player_id, conn)
                .map(|previous| (previous, directory.room_of(request.player_id)))
        };
        let error_code = match bound {
            Ok((previous, room_id)) => {
                match previous {
                    Some(old) => tracing::info!(
                        %conn,
                        player = %request.player_id,
                        %old,
                        "battle connection replaced"
                    ),
                    None => tracing::info!(%conn, player = %request.player_id, "battle connected"),
                }
                // A reconnect while ready keeps receiving frames on the new
                // connection without another Ready.
                if let Some(slot) = room_id.and_then(|id| self.state.rooms.get(id).ok()) {
                    if slot.rebind(request.player_id, conn) {
                        tracing::info!(
                            %conn,
                            player = %request.player_id,
                            room_id = %slot.id(),
                            "ready player moved to new battle connection"
                        );
                    }
                }
                BattleErrorCode::Ok
            }
            Err(error) => {
                tracing::warn!(%conn, %error, "connect refused");
                BattleErrorCode::PlayerNotFound
            }
        };
        self.send(conn, BattleCommand::Connect, &ConnectReply { error_code })
    }

    fn ready(&self, conn: ConnectionId, payload: &[u8]) -> Result<(), ProtocolError> {
        let request: ReadyRequest = self.state.codec.decode(payload)?;
        tracing::debug!(
            %conn,
            player = %request.player_id,
            room_id = %request.room_id,
            "ready request"
        );
        let refuse = |error_code: BattleErrorCode| {
            let reply = ReadyReply {
                error_code,
                room_id: request.room_id,
                roster: Vec::new(),
            };
            self.send(conn, BattleCommand::Ready, &reply)
        };

        let bound = self.state.directory.lock().player_by_battle(conn);
        if bound != Some(request.player_id) {
            tracing::warn!(%conn, player = %request.player_id, "ready before connect");
            return refuse(BattleErrorCode::PlayerNotFound);
        }
        let slot = match self.state.rooms.get(request.room_id) {
            Ok(slot) => slot,
            Err(error) => return refuse(error.battle_code()),
        };
        let outcome = match slot.ready(request.player_id, conn) {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::debug!(%conn, %error, "ready refused");
                return refuse(error.battle_code());
            }
        };

        let reply = ReadyReply {
            error_code: BattleErrorCode::Ok,
            room_id: request.room_id,
            roster: outcome.roster,
        };
        self.send_all(&outcome.recipients, BattleCommand::Ready, &reply)?;

        if let Some(start) = outcome.start {
            self.send_all(&outcome.recipients, BattleCommand::Start, &start)?;
            slot.spawn_ticker(Arc::clone(&self.sink), Arc::clone(&self.state.codec));
        }
        Ok(())
    }

    fn heartbeat(&self, conn: ConnectionId, payload: &[u8]) -> Result<(), ProtocolError> {
        let request: HeartbeatRequest = self.state.codec.decode(payload)?;
        tracing::trace!(%conn, player = %request.player_id, timestamp = request.timestamp, "heartbeat");
        let reply = HeartbeatReply {
            error_code: BattleErrorCode::Ok,
            timestamp: request.timestamp,
        };
        self.send(conn, BattleCommand::Heartbeat, &reply)
    }

    fn frame(&self, conn: ConnectionId, payload: &[u8]) -> Result<(), ProtocolError> {
        let input: FrameInput = self.state.codec.decode(payload)?;
        let Some((player, slot)) = self.resolve(conn) else {
            tracing::warn!(%conn, frame = input.frame, "input from unbound connection");
            return Ok(());
        };
        tracing::trace!(%conn, %player, frame = input.frame, input = input.input, "frame input");

        let recorded = slot.lock().record_input(player, input);
        if let Err(error) = recorded {
            tracing::warn!(%player, frame = input.frame, %error, "input dropped");
        }
        Ok(())
    }

    fn check(&self, conn: ConnectionId, payload: &[u8]) -> Result<(), ProtocolError> {
        let request: CheckRequest = self.state.codec.decode(payload)?;
        let Some((player, slot)) = self.resolve(conn) else {
            let reply = CheckReply {
                error_code: BattleErrorCode::PlayerNotFound,
                frame: request.frame,
            };
            return self.send(conn, BattleCommand::Check, &reply);
        };
        tracing::debug!(
            %conn,
            %player,
            frame = request.frame,
            position = request.position,
            "state check"
        );

        let submitted = slot.lock().submit_check(player, request);
        match submitted {
            Ok(Some(verdict)) => {
                let conns: Vec<ConnectionId> = {
                    let directory = self.state.directory.lock();
                    verdict
                        .members
                        .iter()
                        .filter_map(|member| directory.battle_conn(*member))
                        .collect()
                };
                self.send_all(&conns, BattleCommand::Check, &verdict.reply)
            }
            Ok(None) => Ok(()),
            Err(error) => {
                tracing::debug!(%player, %error, "check refused");
                let reply = CheckReply {
                    error_code: error.battle_code(),
                    frame: request.frame,
                };
                self.send(conn, BattleCommand::Check, &reply)
            }
        }
    }

    /// The player bound to `conn` and the room it belongs to.
    fn resolve(&self, conn: ConnectionId) -> Option<(PlayerId, Arc<RoomSlot>)> {
        let (player, room_id) = {
            let directory = self.state.directory.lock();
            let player = directory.player_by_battle(conn)?;
            (player, directory.room_of(player)?)
        };
        let slot = self.state.rooms.get(room_id).ok()?;
        Some((player, slot))
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    fn send<T: Serialize>(
        &self,
        conn: ConnectionId,
        cmd: BattleCommand,
        body: &T,
    ) -> Result<(), ProtocolError> {
        self.send_all(&[conn], cmd, body)
    }

    fn send_all<T: Serialize>(
        &self,
        conns: &[ConnectionId],
        cmd: BattleCommand,
        body: &T,
    ) -> Result<(), ProtocolError> {
        let payload = self.state.codec.encode(body)?;
        for conn in conns {
            if let Err(error) = self.sink.send_packet(*conn, cmd.into(), &payload) {
                tracing::debug!(%conn, ?cmd, %error, "battle send not delivered");
            }
        }
        Ok(())
    }
}

impl<A, C, S> PacketHandler for BattleService<A, C, S>
where
    A: Authenticator,
    C: Codec,
    S: PacketSink,
{
    fn on_connected(&self, conn: ConnectionId, addr: SocketAddr) {
        tracing::debug!(%conn, %addr, "battle peer connected");
    }

    fn on_packet(&self, conn: ConnectionId, cmd: u8, payload: &[u8]) -> Result<(), ProtocolError> {
        match BattleCommand::try_from(cmd)? {
            BattleCommand::Connect => self.connect(conn, payload),
            BattleCommand::Ready => self.ready(conn, payload),
            BattleCommand::Heartbeat => self.heartbeat(conn, payload),
            BattleCommand::Frame => self.frame(conn, payload),
            BattleCommand::Check => self.check(conn, payload),
            BattleCommand::Start => {
                tracing::debug!(%conn, "ignoring client-sent start");
                Ok(())
            }
        }
    }

    /// Drops the player from its room's ready set. It stays a member and
    /// can `Connect` and `Ready` again.
    fn on_disconnected(&self, conn: ConnectionId) {
        let resolved = {
            let mut directory = self.state.directory.lock();
            directory
                .unbind_battle(conn)
                .map(|player| (player, directory.room_of(player)))
        };
        let Some((player, room_id)) = resolved else {
            tracing::debug!(%conn, "unbound battle peer disconnected");
            return;
        };
        tracing::info!(%conn, %player, "battle disconnected");

        let Some(slot) = room_id.and_then(|id| self.state.rooms.get(id).ok()) else {
            return;
        };
        let outcome = slot.disconnect(player);
        if outcome.was_ready {
            tracing::info!(
                room_id = %slot.id(),
                %player,
                closed = outcome.closed,
                "player left ready set"
            );
        }
    }
}
