//! Message bodies for every command on both channels.
//!
//! Each struct is the payload that follows the 5-byte header for one
//! command. Requests flow client to server, replies and broadcasts flow
//! back. Bodies are plain serde structs; the [`Codec`](crate::Codec) decides
//! their byte layout.

use serde::{Deserialize, Serialize};

use crate::{BattleErrorCode, LobbyErrorCode, PlayerId, RoomId};

// ---------------------------------------------------------------------------
// Lobby channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub account: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginReply {
    pub error_code: LobbyErrorCode,
    /// Zero when `error_code` isn't `Ok`.
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRoomRequest {
    pub player_id: PlayerId,
}

/// Sent to every logged-in lobby connection when a room is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRoomReply {
    pub error_code: LobbyErrorCode,
    pub room_id: RoomId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoomRequest {
    pub room_id: RoomId,
    pub player_id: PlayerId,
}

/// On success, broadcast to every logged-in lobby connection. On failure,
/// sent only to the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoomReply {
    pub error_code: LobbyErrorCode,
    pub room_id: RoomId,
    /// Member ids in seat order (ascending id).
    pub members: Vec<PlayerId>,
}

// ---------------------------------------------------------------------------
// Battle channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub player_id: PlayerId,
    pub season_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectReply {
    pub error_code: BattleErrorCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyRequest {
    pub player_id: PlayerId,
    pub room_id: RoomId,
}

/// Broadcast to every ready player whenever the ready roster changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyReply {
    pub error_code: BattleErrorCode,
    pub room_id: RoomId,
    /// Ready player ids in the order they became ready.
    pub roster: Vec<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub player_id: PlayerId,
    /// Client clock, echoed back untouched.
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatReply {
    pub error_code: BattleErrorCode,
    pub timestamp: u64,
}

/// One input byte for one client-local frame.
///
/// The low bit of `input` is overwritten with the sender's seat before
/// the byte is relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInput {
    pub frame: u32,
    pub input: u8,
}

/// The canonical snapshot for one authoritative frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameBroadcast {
    pub frame: u32,
    pub member_count: u8,
    /// Bit `n` set means seat `n` sent input for this frame.
    pub input_mask: u8,
    /// One byte per seat, indexed by seat.
    pub inputs: Vec<u8>,
}

/// Sent once per room when the battle starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartBroadcast {
    pub error_code: BattleErrorCode,
    /// First authoritative frame (always 0).
    pub frame: u32,
    /// Battle clock in milliseconds at start.
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub frame: u32,
    pub position: u8,
    /// Client-computed integrity value (a state hash).
    pub value: i64,
}

/// Broadcast to every member once all seats have reported for `frame`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReply {
    pub error_code: BattleErrorCode,
    pub frame: u32,
}
