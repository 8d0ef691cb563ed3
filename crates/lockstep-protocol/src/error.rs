//! Error types for the protocol layer.
//!
//! Each crate in the workspace defines its own error enum. A
//! `ProtocolError` always means the bytes themselves were wrong: a short
//! header, a bad length, an unknown command or a body that doesn't parse.
//! Transports treat any of these as grounds to drop the connection.

/// Errors that can occur while framing or decoding packets.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Fewer bytes were available than the header or payload requires.
    #[error("truncated packet: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// The header's length field was negative.
    #[error("negative payload length {0}")]
    NegativeLength(i32),

    /// The command id isn't defined on this channel.
    #[error("unknown command {0}")]
    UnknownCommand(u8),

    /// Serializing a message body failed.
    #[error("encode failed: {0}")]
    Encode(bincode::Error),

    /// Deserializing a message body failed. Usually a body that is too
    /// short or doesn't match the command's message type.
    #[error("decode failed: {0}")]
    Decode(bincode::Error),

    /// The body parsed but violates protocol rules.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
