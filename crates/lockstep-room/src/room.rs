//! One battle room: membership, readiness, seats, and frame inputs.
//!
//! `Room` is plain state with no I/O. Every mutation returns what should be
//! sent and to whom; the caller sends after releasing the room lock. The
//! room is shared between the battle handlers and its own tick task, so it
//! always lives behind the mutex in [`RoomSlot`](crate::RoomSlot).
//!
//! # Seats
//!
//! A member gets a seat the first time it sends `Ready`. The seat holds the
//! member's position and its input byte for every frame. Positions are the
//! rank of the member's id among all member ids, so with members 101 and
//! 102 the seats are 0 and 1 regardless of who was ready first. Positions
//! are recomputed when the battle starts, since the roster can still grow
//! before that.

use std::collections::BTreeMap;

use lockstep_protocol::{
    BattleErrorCode, CheckReply, CheckRequest, FrameBroadcast, FrameInput, PlayerId, RoomId,
    StartBroadcast,
};
use lockstep_transport::ConnectionId;
use tokio::time::Instant;

use crate::{BattleConfig, RoomError, RoomState};

/// Authoritative frame value before the battle starts.
pub const NOT_STARTED: i64 = -1;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of [`Room::join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Member ids in ascending order, after the join.
    pub members: Vec<PlayerId>,
    /// `false` when the player was already a member.
    pub joined: bool,
    /// `true` when this join filled the last slot.
    pub filled: bool,
}

/// Result of [`Room::ready`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyOutcome {
    /// The sender's seat.
    pub position: u8,
    /// Ready player ids in the order they became ready.
    pub roster: Vec<PlayerId>,
    /// Battle connections of every ready player.
    pub recipients: Vec<ConnectionId>,
    /// Set only by the `Ready` that started the battle.
    pub start: Option<StartBroadcast>,
}

/// One authoritative frame, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutput {
    pub broadcast: FrameBroadcast,
    pub recipients: Vec<ConnectionId>,
    /// `true` when this frame exhausted the room's frame capacity.
    pub closed: bool,
}

/// A consistency verdict, produced once every seat has reported a frame.
///
/// Goes to every member, ready or not. The room only knows the battle
/// connections of ready players, so the caller resolves `members`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckVerdict {
    pub reply: CheckReply,
    pub members: Vec<PlayerId>,
}

/// Result of [`Room::disconnect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisconnectOutcome {
    /// The player was in the ready set.
    pub was_ready: bool,
    /// This disconnect closed the room.
    pub closed: bool,
}

// ---------------------------------------------------------------------------
// Seat
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Seat {
    player: PlayerId,
    position: u8,
    /// Raw input byte per frame, last write wins.
    frames: Box<[u8]>,
    /// Highest frame index this seat has sent.
    last_frame: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
struct ReadyEntry {
    player: PlayerId,
    conn: ConnectionId,
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// State for one battle room. See the module docs.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    state: RoomState,
    config: BattleConfig,
    /// Ascending.
    members: Vec<PlayerId>,
    /// In the order players became ready.
    ready: Vec<ReadyEntry>,
    seats: Vec<Seat>,
    authoritative_frame: i64,
    /// Bit `n` of entry `f`: seat `n` sent input for frame `f`.
    input_masks: Box<[u8]>,
    started_at: Option<Instant>,
    /// Pending integrity values per frame, one per seat.
    checks: BTreeMap<u32, Vec<(u8, i64)>>,
}

impl Room {
    /// Creates an empty room in [`RoomState::Created`].
    pub fn new(id: RoomId, config: BattleConfig) -> Self {
        let config = config.validated();
        Self {
            id,
            state: RoomState::Created,
            input_masks: vec![0u8; config.max_frames].into_boxed_slice(),
            config,
            members: Vec::new(),
            ready: Vec::new(),
            seats: Vec::new(),
            authoritative_frame: NOT_STARTED,
            started_at: None,
            checks: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn config(&self) -> &BattleConfig {
        &self.config
    }

    /// Member ids in ascending order.
    pub fn members(&self) -> &[PlayerId] {
        &self.members
    }

    pub fn is_member(&self, player: PlayerId) -> bool {
        self.members.binary_search(&player).is_ok()
    }

    /// Ready player ids in the order they became ready.
    pub fn ready_roster(&self) -> Vec<PlayerId> {
        self.ready.iter().map(|e| e.player).collect()
    }

    pub fn is_ready(&self, player: PlayerId) -> bool {
        self.ready.iter().any(|e| e.player == player)
    }

    /// The next frame the tick will broadcast, or [`NOT_STARTED`].
    pub fn authoritative_frame(&self) -> i64 {
        self.authoritative_frame
    }

    /// The player's seat, once it has sent `Ready`.
    pub fn position_of(&self, player: PlayerId) -> Option<u8> {
        self.seat(player).map(|s| s.position)
    }

    /// Highest frame index the player has sent input for.
    pub fn last_frame_of(&self, player: PlayerId) -> Option<u32> {
        self.seat(player).and_then(|s| s.last_frame)
    }

    /// Milliseconds since the battle started, 0 before that.
    pub fn battle_clock_ms(&self) -> u64 {
        self.started_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    /// Battle connections of every ready player.
    pub fn recipients(&self) -> Vec<ConnectionId> {
        self.ready.iter().map(|e| e.conn).collect()
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Adds `player` as a member. Joining twice is a no-op.
    ///
    /// # Errors
    /// - [`RoomError::Closed`] if the room has closed.
    /// - [`RoomError::RoomFull`] if every slot is taken.
    pub fn join(&mut self, player: PlayerId) -> Result<JoinOutcome, RoomError> {
        if self.state == RoomState::Closed {
            return Err(RoomError::Closed(self.id));
        }
        if self.is_member(player) {
            return Ok(JoinOutcome {
                members: self.members.clone(),
                joined: false,
                filled: false,
            });
        }
        if !self.state.is_joinable() || self.members.len() >= self.config.max_players {
            return Err(RoomError::RoomFull(self.id));
        }

        let at = self.members.partition_point(|m| *m < player);
        self.members.insert(at, player);
        tracing::info!(
            room_id = %self.id,
            %player,
            members = self.members.len(),
            "player joined room"
        );

        let filled = self.members.len() == self.config.max_players;
        if filled {
            self.transition(RoomState::WaitingReady);
        }
        Ok(JoinOutcome {
            members: self.members.clone(),
            joined: true,
            filled,
        })
    }

    // -----------------------------------------------------------------------
    // Readiness
    // -----------------------------------------------------------------------

    /// Marks `player` ready on battle connection `conn`.
    ///
    /// Idempotent: a repeated `Ready` keeps the player's place in the roster
    /// and only updates its connection, which is how a reconnecting client
    /// rejoins a running battle. The `Ready` that completes the roster
    /// starts the battle; no later `Ready` starts it again.
    ///
    /// # Errors
    /// - [`RoomError::Closed`] if the room has closed.
    /// - [`RoomError::NotInRoom`] if `player` isn't a member.
    pub fn ready(
        &mut self,
        player: PlayerId,
        conn: ConnectionId,
    ) -> Result<ReadyOutcome, RoomError> {
        if self.state == RoomState::Closed {
            return Err(RoomError::Closed(self.id));
        }
        if !self.is_member(player) {
            return Err(RoomError::NotInRoom(player, self.id));
        }

        match self.ready.iter_mut().find(|e| e.player == player) {
            Some(entry) => entry.conn = conn,
            None => self.ready.push(ReadyEntry { player, conn }),
        }
        if self.seat(player).is_none() {
            let position = self.rank_of(player);
            self.seats.push(Seat {
                player,
                position,
                frames: vec![0u8; self.config.max_frames].into_boxed_slice(),
                last_frame: None,
            });
        }

        let start = if self.state == RoomState::WaitingReady
            && self.ready.len() == self.config.max_players
        {
            Some(self.start())
        } else {
            None
        };

        let position = self.position_of(player).unwrap_or_default();
        tracing::debug!(
            room_id = %self.id,
            %player,
            position,
            ready = self.ready.len(),
            "player ready"
        );
        Ok(ReadyOutcome {
            position,
            roster: self.ready_roster(),
            recipients: self.recipients(),
            start,
        })
    }

    /// Moves a ready player's broadcasts to a new battle connection.
    /// Returns `false` if `player` isn't in the ready set.
    pub fn rebind(&mut self, player: PlayerId, conn: ConnectionId) -> bool {
        let Some(entry) = self.ready.iter_mut().find(|e| e.player == player) else {
            return false;
        };
        if entry.conn != conn {
            tracing::debug!(
                room_id = %self.id,
                %player,
                old = %entry.conn,
                new = %conn,
                "ready entry rebound"
            );
            entry.conn = conn;
        }
        true
    }

    fn start(&mut self) -> StartBroadcast {
        for i in 0..self.seats.len() {
            let position = self.rank_of(self.seats[i].player);
            self.seats[i].position = position;
        }
        self.seats.sort_by_key(|s| s.position);
        self.authoritative_frame = 0;
        self.started_at = Some(Instant::now());
        self.transition(RoomState::Running);
        tracing::info!(
            room_id = %self.id,
            members = self.members.len(),
            "battle started"
        );
        StartBroadcast {
            error_code: BattleErrorCode::Ok,
            frame: 0,
            timestamp: self.battle_clock_ms(),
        }
    }

    // -----------------------------------------------------------------------
    // Inputs
    // -----------------------------------------------------------------------

    /// Stores `input.input` as `player`'s byte for `input.frame` and marks
    /// the seat in that frame's input mask. A resend for the same frame
    /// overwrites the earlier byte.
    ///
    /// # Errors
    /// - [`RoomError::Closed`] once the room has closed.
    /// - [`RoomError::NotRunning`] before the battle starts.
    /// - [`RoomError::NotReady`] if `player` has no seat.
    /// - [`RoomError::FrameOutOfRange`] past the frame capacity.
    pub fn record_input(&mut self, player: PlayerId, input: FrameInput) -> Result<(), RoomError> {
        self.check_running()?;
        let max = self.config.max_frames;
        let index = input.frame as usize;
        if index >= max {
            return Err(RoomError::FrameOutOfRange {
                frame: input.frame,
                max,
            });
        }
        let id = self.id;
        let seat = self
            .seats
            .iter_mut()
            .find(|s| s.player == player)
            .ok_or(RoomError::NotReady(player, id))?;

        seat.frames[index] = input.input;
        seat.last_frame = Some(seat.last_frame.map_or(input.frame, |f| f.max(input.frame)));
        self.input_masks[index] |= 1 << seat.position;

        if i64::from(input.frame) < self.authoritative_frame {
            tracing::trace!(
                room_id = %id,
                %player,
                frame = input.frame,
                authoritative = self.authoritative_frame,
                "input for a frame already broadcast"
            );
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Builds the broadcast for the current authoritative frame and
    /// advances it by one. Returns `None` unless the room is running.
    ///
    /// Missing inputs never hold the tick back: a seat with nothing for
    /// this frame contributes a zero byte. Each byte's low bit is replaced
    /// by the seat's position. Frame 0 always reports every seat as
    /// present.
    pub fn tick(&mut self) -> Option<TickOutput> {
        if !self.state.is_running() {
            return None;
        }
        let index = usize::try_from(self.authoritative_frame).ok()?;
        if index >= self.config.max_frames {
            self.close();
            return None;
        }

        if index == 0 {
            self.input_masks[0] = full_mask(self.seats.len());
        }
        let inputs = self
            .seats
            .iter()
            .map(|s| (s.frames[index] & !1) | s.position)
            .collect();
        let broadcast = FrameBroadcast {
            frame: index as u32,
            member_count: self.members.len() as u8,
            input_mask: self.input_masks[index],
            inputs,
        };

        self.authoritative_frame += 1;
        let closed = self.authoritative_frame as usize >= self.config.max_frames;
        if closed {
            tracing::info!(
                room_id = %self.id,
                frames = self.config.max_frames,
                "frame capacity reached"
            );
            self.close();
        }

        Some(TickOutput {
            broadcast,
            recipients: self.recipients(),
            closed,
        })
    }

    // -----------------------------------------------------------------------
    // Consistency check
    // -----------------------------------------------------------------------

    /// Buffers `player`'s integrity value for `check.frame`. Once every seat
    /// has reported that frame, returns the verdict: `Ok` if all values are
    /// equal, `CheckDiverged` otherwise. A seat reporting the same frame
    /// twice replaces its earlier value.
    ///
    /// The seat comes from the room, not from `check.position`.
    ///
    /// # Errors
    /// Same as [`record_input`](Self::record_input).
    pub fn submit_check(
        &mut self,
        player: PlayerId,
        check: CheckRequest,
    ) -> Result<Option<CheckVerdict>, RoomError> {
        self.check_running()?;
        let max = self.config.max_frames;
        if check.frame as usize >= max {
            return Err(RoomError::FrameOutOfRange {
                frame: check.frame,
                max,
            });
        }
        let position = self
            .position_of(player)
            .ok_or(RoomError::NotReady(player, self.id))?;
        if position != check.position {
            tracing::debug!(
                room_id = %self.id,
                %player,
                claimed = check.position,
                position,
                "check position mismatch"
            );
        }

        let seats = self.seats.len();
        let pending = self.checks.entry(check.frame).or_default();
        match pending.iter_mut().find(|(p, _)| *p == position) {
            Some(slot) => slot.1 = check.value,
            None => pending.push((position, check.value)),
        }
        if pending.len() < seats {
            return Ok(None);
        }

        let values = self.checks.remove(&check.frame).unwrap_or_default();
        let consistent = values.windows(2).all(|w| w[0].1 == w[1].1);
        let error_code = if consistent {
            BattleErrorCode::Ok
        } else {
            tracing::warn!(
                room_id = %self.id,
                frame = check.frame,
                ?values,
                "state check diverged"
            );
            BattleErrorCode::CheckDiverged
        };
        Ok(Some(CheckVerdict {
            reply: CheckReply {
                error_code,
                frame: check.frame,
            },
            members: self.members.clone(),
        }))
    }

    /// Frames with at least one but not all integrity values reported.
    pub fn pending_checks(&self) -> usize {
        self.checks.len()
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Drops `player` from the ready set. It stays a member and keeps its
    /// seat, so it can send `Ready` again. A running room with nobody left
    /// ready closes.
    pub fn disconnect(&mut self, player: PlayerId) -> DisconnectOutcome {
        let before = self.ready.len();
        self.ready.retain(|e| e.player != player);
        let was_ready = self.ready.len() != before;

        let closed = was_ready && self.state.is_running() && self.ready.is_empty();
        if closed {
            tracing::info!(room_id = %self.id, "every member disconnected");
            self.close();
        }
        DisconnectOutcome { was_ready, closed }
    }

    /// Moves the room to [`RoomState::Closed`]. Idempotent.
    pub fn close(&mut self) {
        if self.state == RoomState::Closed {
            return;
        }
        self.transition(RoomState::Closed);
        self.checks.clear();
        tracing::info!(
            room_id = %self.id,
            frame = self.authoritative_frame,
            "room closed"
        );
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn check_running(&self) -> Result<(), RoomError> {
        match self.state {
            RoomState::Running => Ok(()),
            RoomState::Closed => Err(RoomError::Closed(self.id)),
            _ => Err(RoomError::NotRunning(self.id)),
        }
    }

    fn seat(&self, player: PlayerId) -> Option<&Seat> {
        self.seats.iter().find(|s| s.player == player)
    }

    fn rank_of(&self, player: PlayerId) -> u8 {
        self.members.partition_point(|m| *m < player) as u8
    }

    fn transition(&mut self, target: RoomState) {
        debug_assert!(
            self.state.can_transition_to(target),
            "invalid room transition {} -> {}",
            self.state,
            target
        );
        tracing::debug!(room_id = %self.id, from = %self.state, to = %target, "room state");
        self.state = target;
    }
}

/// A mask with the low `seats` bits set.
fn full_mask(seats: usize) -> u8 {
    ((1u16 << seats) - 1) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOM: RoomId = RoomId(10001);
    const A: PlayerId = PlayerId(101);
    const B: PlayerId = PlayerId(102);

    fn conn(n: u64) -> ConnectionId {
        ConnectionId::new(n)
    }

    fn config(max_frames: usize) -> BattleConfig {
        BattleConfig {
            max_frames,
            ..BattleConfig::default()
        }
    }

    fn running_room(max_frames: usize) -> Room {
        let mut room = Room::new(ROOM, config(max_frames));
        room.join(A).unwrap();
        room.join(B).unwrap();
        room.ready(A, conn(1)).unwrap();
        room.ready(B, conn(2)).unwrap();
        room
    }

    // =====================================================================
    // Membership
    // =====================================================================

    #[test]
    fn test_join_keeps_members_sorted_and_fills() {
        let mut room = Room::new(ROOM, config(16));
        let first = room.join(B).unwrap();
        assert!(first.joined);
        assert!(!first.filled);
        assert_eq!(room.state(), RoomState::Created);

        let second = room.join(A).unwrap();
        assert_eq!(second.members, vec![A, B]);
        assert!(second.filled);
        assert_eq!(room.state(), RoomState::WaitingReady);
    }

    #[test]
    fn test_join_twice_is_idempotent() {
        let mut room = Room::new(ROOM, config(16));
        room.join(A).unwrap();
        let again = room.join(A).unwrap();
        assert!(!again.joined);
        assert_eq!(again.members, vec![A]);
    }

    #[test]
    fn test_join_full_room_fails() {
        let mut room = Room::new(ROOM, config(16));
        room.join(A).unwrap();
        room.join(B).unwrap();
        let err = room.join(PlayerId(103)).unwrap_err();
        assert!(matches!(err, RoomError::RoomFull(ROOM)));
    }

    // =====================================================================
    // Readiness
    // =====================================================================

    #[test]
    fn test_ready_from_non_member_fails() {
        let mut room = Room::new(ROOM, config(16));
        room.join(A).unwrap();
        let err = room.ready(B, conn(2)).unwrap_err();
        assert!(matches!(err, RoomError::NotInRoom(B, ROOM)));
    }

    #[test]
    fn test_positions_follow_id_order_not_ready_order() {
        let mut room = Room::new(ROOM, config(16));
        room.join(A).unwrap();
        room.join(B).unwrap();

        let first = room.ready(B, conn(2)).unwrap();
        assert_eq!(first.position, 1);
        assert_eq!(first.roster, vec![B]);
        assert!(first.start.is_none());

        let second = room.ready(A, conn(1)).unwrap();
        assert_eq!(second.position, 0);
        assert_eq!(second.roster, vec![B, A]);
        assert_eq!(second.recipients, vec![conn(2), conn(1)]);
        assert_eq!(room.position_of(B), Some(1));
    }

    #[test]
    fn test_positions_recomputed_when_lower_id_joins_late() {
        let mut room = Room::new(ROOM, config(16));
        room.join(B).unwrap();
        assert_eq!(room.ready(B, conn(2)).unwrap().position, 0);

        room.join(A).unwrap();
        let outcome = room.ready(A, conn(1)).unwrap();
        assert!(outcome.start.is_some());
        assert_eq!(room.position_of(A), Some(0));
        assert_eq!(room.position_of(B), Some(1));
    }

    #[test]
    fn test_battle_starts_exactly_once() {
        let mut room = Room::new(ROOM, config(16));
        room.join(A).unwrap();
        room.join(B).unwrap();
        assert!(room.ready(A, conn(1)).unwrap().start.is_none());

        let start = room.ready(B, conn(2)).unwrap().start.unwrap();
        assert_eq!(start.frame, 0);
        assert!(start.error_code.is_ok());
        assert_eq!(room.state(), RoomState::Running);
        assert_eq!(room.authoritative_frame(), 0);

        // Repeats and re-readies after a disconnect never start it again.
        assert!(room.ready(A, conn(1)).unwrap().start.is_none());
        room.disconnect(B);
        assert!(room.ready(B, conn(9)).unwrap().start.is_none());
        assert_eq!(room.ready_roster(), vec![A, B]);
    }

    #[test]
    fn test_ready_before_room_is_full_does_not_start() {
        let mut room = Room::new(ROOM, config(16));
        room.join(A).unwrap();
        let outcome = room.ready(A, conn(1)).unwrap();
        assert!(outcome.start.is_none());
        assert_eq!(room.authoritative_frame(), NOT_STARTED);
    }

    // =====================================================================
    // Inputs and tick
    // =====================================================================

    #[test]
    fn test_input_before_start_is_rejected() {
        let mut room = Room::new(ROOM, config(16));
        room.join(A).unwrap();
        room.ready(A, conn(1)).unwrap();
        let err = room
            .record_input(A, FrameInput { frame: 0, input: 1 })
            .unwrap_err();
        assert!(matches!(err, RoomError::NotRunning(ROOM)));
    }

    #[test]
    fn test_input_past_capacity_is_rejected() {
        let mut room = running_room(16);
        let err = room
            .record_input(A, FrameInput { frame: 16, input: 1 })
            .unwrap_err();
        assert!(matches!(err, RoomError::FrameOutOfRange { frame: 16, max: 16 }));
    }

    #[test]
    fn test_tick_advances_without_input() {
        let mut room = running_room(16);
        for expected in 0..5u32 {
            let out = room.tick().unwrap();
            assert_eq!(out.broadcast.frame, expected);
            assert_eq!(out.broadcast.inputs, vec![0, 1]);
            assert_eq!(out.recipients, vec![conn(1), conn(2)]);
        }
        assert_eq!(room.authoritative_frame(), 5);
    }

    #[test]
    fn test_frame_zero_mask_reports_every_seat() {
        let mut room = running_room(16);
        let first = room.tick().unwrap().broadcast;
        assert_eq!(first.input_mask, 0b11);
        assert_eq!(first.member_count, 2);

        let second = room.tick().unwrap().broadcast;
        assert_eq!(second.input_mask, 0);
    }

    #[test]
    fn test_tick_overwrites_low_bit_with_position() {
        let mut room = running_room(16);
        room.record_input(A, FrameInput { frame: 0, input: 0b1011 }).unwrap();
        room.record_input(B, FrameInput { frame: 0, input: 0b0110 }).unwrap();

        let out = room.tick().unwrap().broadcast;
        assert_eq!(out.inputs, vec![0b1010, 0b0111]);
    }

    #[test]
    fn test_resent_input_last_write_wins() {
        let mut room = running_room(16);
        room.record_input(A, FrameInput { frame: 1, input: 0b0000_0100 }).unwrap();
        room.record_input(A, FrameInput { frame: 1, input: 0b1000_0101 }).unwrap();
        assert_eq!(room.last_frame_of(A), Some(1));

        room.tick().unwrap();
        let out = room.tick().unwrap().broadcast;
        assert_eq!(out.frame, 1);
        assert_eq!(out.inputs[0], 0b1000_0100);
        assert_eq!(out.input_mask, 0b01);
    }

    #[test]
    fn test_tick_closes_room_at_capacity() {
        let mut room = running_room(3);
        assert!(!room.tick().unwrap().closed);
        assert!(!room.tick().unwrap().closed);
        let last = room.tick().unwrap();
        assert!(last.closed);
        assert_eq!(last.broadcast.frame, 2);
        assert_eq!(room.state(), RoomState::Closed);
        assert!(room.tick().is_none());
    }

    #[test]
    fn test_tick_before_start_is_none() {
        let mut room = Room::new(ROOM, config(16));
        assert!(room.tick().is_none());
        assert_eq!(room.authoritative_frame(), NOT_STARTED);
    }

    // =====================================================================
    // Consistency check
    // =====================================================================

    #[test]
    fn test_check_waits_for_every_seat() {
        let mut room = running_room(16);
        let first = room
            .submit_check(A, CheckRequest { frame: 4, position: 0, value: 77 })
            .unwrap();
        assert!(first.is_none());
        assert_eq!(room.pending_checks(), 1);

        let verdict = room
            .submit_check(B, CheckRequest { frame: 4, position: 1, value: 77 })
            .unwrap()
            .unwrap();
        assert_eq!(verdict.reply.frame, 4);
        assert!(verdict.reply.error_code.is_ok());
        assert_eq!(verdict.members, vec![A, B]);
        assert_eq!(room.pending_checks(), 0);
    }

    #[test]
    fn test_check_reports_divergence() {
        let mut room = running_room(16);
        room.submit_check(A, CheckRequest { frame: 2, position: 0, value: 1 })
            .unwrap();
        let verdict = room
            .submit_check(B, CheckRequest { frame: 2, position: 1, value: 2 })
            .unwrap()
            .unwrap();
        assert_eq!(verdict.reply.error_code, BattleErrorCode::CheckDiverged);
    }

    #[test]
    fn test_check_resubmit_from_same_seat_does_not_complete() {
        let mut room = running_room(16);
        for value in [5, 6] {
            let out = room
                .submit_check(A, CheckRequest { frame: 3, position: 0, value })
                .unwrap();
            assert!(out.is_none());
        }
        let verdict = room
            .submit_check(B, CheckRequest { frame: 3, position: 1, value: 6 })
            .unwrap()
            .unwrap();
        assert!(verdict.reply.error_code.is_ok());
    }

    // =====================================================================
    // Disconnect
    // =====================================================================

    #[test]
    fn test_disconnect_keeps_membership_and_tick() {
        let mut room = running_room(16);
        let out = room.disconnect(A);
        assert!(out.was_ready);
        assert!(!out.closed);
        assert!(room.is_member(A));
        assert_eq!(room.state(), RoomState::Running);

        let tick = room.tick().unwrap();
        assert_eq!(tick.recipients, vec![conn(2)]);
        assert_eq!(tick.broadcast.inputs.len(), 2);
    }

    #[test]
    fn test_last_disconnect_closes_running_room() {
        let mut room = running_room(16);
        room.disconnect(A);
        let out = room.disconnect(B);
        assert!(out.closed);
        assert_eq!(room.state(), RoomState::Closed);
        assert!(matches!(room.ready(A, conn(1)), Err(RoomError::Closed(ROOM))));
    }

    #[test]
    fn test_rebind_moves_broadcasts_to_new_connection() {
        let mut room = running_room(16);
        assert!(room.rebind(A, conn(21)));

        let tick = room.tick().unwrap();
        assert_eq!(tick.recipients, vec![conn(21), conn(2)]);
        assert_eq!(room.ready_roster(), vec![A, B]);
    }

    #[test]
    fn test_rebind_of_player_not_ready_is_noop() {
        let mut room = running_room(16);
        room.disconnect(A);
        assert!(!room.rebind(A, conn(21)));
        assert_eq!(room.recipients(), vec![conn(2)]);
    }

    #[test]
    fn test_disconnect_before_start_never_closes() {
        let mut room = Room::new(ROOM, config(16));
        room.join(A).unwrap();
        room.ready(A, conn(1)).unwrap();
        let out = room.disconnect(A);
        assert!(out.was_ready);
        assert!(!out.closed);
        assert_eq!(room.state(), RoomState::Created);
    }

    #[test]
    fn test_full_mask() {
        assert_eq!(full_mask(1), 0b1);
        assert_eq!(full_mask(2), 0b11);
        assert_eq!(full_mask(8), 0xFF);
    }
}
