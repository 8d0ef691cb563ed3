//! Unified error type for the lockstep server.

use lockstep_protocol::ProtocolError;
use lockstep_room::RoomError;
use lockstep_session::SessionError;
use lockstep_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls, so
/// the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum LockstepError {
    /// A transport-level error (bind, send, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (framing, encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (login refused, unknown player).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (full, not found, closed).
    #[error(transparent)]
    Room(#[from] RoomError),
}
