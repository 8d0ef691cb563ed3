//! Error types for the room layer.

use lockstep_protocol::{BattleErrorCode, LobbyErrorCode, PlayerId, RoomId};

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// Every member slot is taken.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// The player is not a member of this room.
    #[error("player {0} not in room {1}")]
    NotInRoom(PlayerId, RoomId),

    /// The player is a member but has never sent `Ready`, so it has no
    /// seat to record input against.
    #[error("player {0} has no seat in room {1}")]
    NotReady(PlayerId, RoomId),

    /// The battle hasn't started yet.
    #[error("room {0} is not running")]
    NotRunning(RoomId),

    /// The room has closed and accepts nothing further.
    #[error("room {0} is closed")]
    Closed(RoomId),

    /// A frame index at or past the room's frame capacity.
    #[error("frame {frame} out of range (max {max})")]
    FrameOutOfRange { frame: u32, max: usize },
}

impl RoomError {
    /// The code reported to a lobby client for this error.
    pub fn lobby_code(&self) -> LobbyErrorCode {
        match self {
            Self::NotFound(_) | Self::Closed(_) => LobbyErrorCode::RoomNotFound,
            Self::RoomFull(_) => LobbyErrorCode::RoomFull,
            Self::NotInRoom(..) | Self::NotReady(..) => LobbyErrorCode::PlayerNotFound,
            Self::NotRunning(_) | Self::FrameOutOfRange { .. } => LobbyErrorCode::RoomNotFound,
        }
    }

    /// The code reported to a battle client for this error.
    pub fn battle_code(&self) -> BattleErrorCode {
        match self {
            Self::NotFound(_) => BattleErrorCode::RoomNotFound,
            Self::NotInRoom(..) | Self::NotReady(..) | Self::RoomFull(_) => {
                BattleErrorCode::NotInRoom
            }
            Self::NotRunning(_) | Self::Closed(_) | Self::FrameOutOfRange { .. } => {
                BattleErrorCode::RoomClosed
            }
        }
    }
}
