//! Wire protocol for the lockstep server.
//!
//! - **Framing** ([`header`]): the 5-byte `cmd` + little-endian length
//!   header shared by the lobby and battle channels.
//! - **Commands** ([`LobbyCommand`], [`BattleCommand`]): what the `cmd` byte
//!   means on each channel.
//! - **Messages** (`LoginRequest`, `FrameBroadcast`, ...): the body struct
//!   behind each command.
//! - **Codec** ([`Codec`], [`BincodeCodec`]): how bodies become bytes.
//!
//! ```text
//! Transport (bytes) → header::split → Codec::decode → handler
//! ```
//!
//! Nothing in this crate performs I/O.

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod command;
mod error;
pub mod header;
mod messages;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{BincodeCodec, Codec};
pub use command::{BattleCommand, LobbyCommand};
pub use error::ProtocolError;
pub use header::{HEADER_LEN, PacketHeader};
pub use messages::{
    CheckReply, CheckRequest, ConnectReply, ConnectRequest, CreateRoomReply,
    CreateRoomRequest, FrameBroadcast, FrameInput, HeartbeatReply, HeartbeatRequest,
    JoinRoomReply, JoinRoomRequest, LoginReply, LoginRequest, ReadyReply, ReadyRequest,
    StartBroadcast,
};
pub use types::{BattleErrorCode, LobbyErrorCode, PlayerId, RoomId};
