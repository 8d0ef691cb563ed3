use lockstep_protocol::ProtocolError;

use crate::ConnectionId;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the listening socket failed.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// Accepting a connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Writing to a socket failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Reading from a socket failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// No open connection has this id.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// A lobby packet announced a payload above the configured limit.
    #[error("packet of {len} bytes exceeds limit of {max}")]
    PacketTooLarge { len: usize, max: usize },

    /// Inbound bytes didn't form a valid packet.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The KCP engine rejected a segment or a send.
    #[error("kcp: {0}")]
    Kcp(String),

    /// The battle transport hasn't been started, or has stopped.
    #[error("transport not running")]
    NotRunning,
}

// `FramedRead` needs its decoder error to absorb raw read errors.
impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::ReceiveFailed(err)
    }
}
