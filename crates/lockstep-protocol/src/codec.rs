//! Codec trait and the binary implementation used for message bodies.
//!
//! The packet header is fixed (see [`crate::header`]); what goes inside the
//! payload is up to a [`Codec`]. Handlers never touch serde directly, they
//! ask the codec to turn a body struct into bytes and back.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes Rust values to payload bytes and decodes them back.
///
/// `Send + Sync + 'static` so a single codec can live in shared server
/// state and be used from any Tokio task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into payload bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes payload bytes into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the bytes are malformed or
    /// don't match `T`.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// BincodeCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `bincode` with its default (little-endian,
/// fixed-width integer) encoding.
///
/// ```rust
/// use lockstep_protocol::{BincodeCodec, Codec, FrameInput};
///
/// let codec = BincodeCodec;
/// let bytes = codec.encode(&FrameInput { frame: 3, input: 0b10 }).unwrap();
/// assert_eq!(bytes.len(), 5);
/// let back: FrameInput = codec.decode(&bytes).unwrap();
/// assert_eq!(back.frame, 3);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        bincode::serialize(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        bincode::deserialize(data).map_err(ProtocolError::Decode)
    }
}
