//! Command ids for the two channels.
//!
//! The header's `cmd` byte is interpreted per channel: `1` is `Login` on the
//! lobby stream and `Connect` on the battle channel.

use crate::ProtocolError;

/// Commands carried on the lobby (TCP) channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LobbyCommand {
    Login = 1,
    CreateRoom = 2,
    JoinRoom = 3,
}

/// Commands carried on the battle (KCP) channel.
///
/// `Start` is server to client only. `Frame` flows both ways: client input
/// in, [`FrameBroadcast`](crate::FrameBroadcast) out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BattleCommand {
    Connect = 1,
    Ready = 2,
    Heartbeat = 3,
    Frame = 4,
    Start = 5,
    Check = 6,
}

impl From<LobbyCommand> for u8 {
    fn from(cmd: LobbyCommand) -> Self {
        cmd as u8
    }
}

impl From<BattleCommand> for u8 {
    fn from(cmd: BattleCommand) -> Self {
        cmd as u8
    }
}

impl TryFrom<u8> for LobbyCommand {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Login),
            2 => Ok(Self::CreateRoom),
            3 => Ok(Self::JoinRoom),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

impl TryFrom<u8> for BattleCommand {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Connect),
            2 => Ok(Self::Ready),
            3 => Ok(Self::Heartbeat),
            4 => Ok(Self::Frame),
            5 => Ok(Self::Start),
            6 => Ok(Self::Check),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}
