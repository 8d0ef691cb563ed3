//! Identity types and wire error codes.
//!
//! Ids are numeric on the wire (`u32`), wrapped in newtypes so a `RoomId`
//! can never be passed where a `PlayerId` is expected. Error codes are the
//! only way logical failures reach a client: a bad room id is a reply with
//! [`LobbyErrorCode::RoomNotFound`], never a dropped connection.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A player's numeric id, allocated on first login.
///
/// Ids are ordered: a player's seat in a room is the rank of its id among
/// the room's members, so `Ord` is part of the contract.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A room's numeric id, allocated on `CreateRoom`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomId(pub u32);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

/// Result code carried by every lobby reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LobbyErrorCode {
    #[default]
    Ok,
    /// The authenticator rejected the credentials.
    AuthFailed,
    PlayerNotFound,
    RoomNotFound,
    /// The room already holds its maximum number of members.
    RoomFull,
    /// The player is already a member of a different room.
    AlreadyInRoom,
}

/// Result code carried by battle replies and check broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BattleErrorCode {
    #[default]
    Ok,
    PlayerNotFound,
    RoomNotFound,
    /// The player exists but isn't a member of the room it named.
    NotInRoom,
    /// The room has closed; it accepts no further battle commands.
    RoomClosed,
    /// Members reported different integrity values for the same frame.
    CheckDiverged,
}

impl LobbyErrorCode {
    /// `true` for [`LobbyErrorCode::Ok`].
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl BattleErrorCode {
    /// `true` for [`BattleErrorCode::Ok`].
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}
