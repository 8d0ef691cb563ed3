//! Error types for the session layer.

use lockstep_protocol::PlayerId;
use lockstep_transport::ConnectionId;

/// Errors that can occur while resolving player identity.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The [`Authenticator`](crate::Authenticator) rejected the login.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No player has this id.
    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),

    /// No player is bound to this connection.
    #[error("no player bound to {0}")]
    UnboundConnection(ConnectionId),
}
