//! Packet framing shared by the lobby and battle channels.
//!
//! Every packet on either channel is a fixed 5-byte header followed by the
//! payload:
//!
//! ```text
//! +--------+---------------------------+----------------------+
//! | cmd u8 | length i32 (little-endian) | payload (length bytes)|
//! +--------+---------------------------+----------------------+
//! ```
//!
//! The header has no padding, and the field order and endianness are fixed
//! so clients on any platform produce the same bytes. Nothing here performs
//! I/O; these are pure functions over byte slices.

use crate::ProtocolError;

/// Length of the packet header in bytes.
pub const HEADER_LEN: usize = 5;

/// The decoded packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Command id. Its meaning depends on the channel.
    pub cmd: u8,
    /// Payload length in bytes, as written on the wire.
    pub length: i32,
}

impl PacketHeader {
    /// Reads a header from the first [`HEADER_LEN`] bytes of `bytes`.
    ///
    /// # Errors
    /// - [`ProtocolError::Truncated`] if fewer than 5 bytes are available.
    /// - [`ProtocolError::NegativeLength`] if the length field is negative.
    pub fn read(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_LEN {
            return Err(ProtocolError::Truncated {
                needed: HEADER_LEN,
                available: bytes.len(),
            });
        }
        let length = i32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        if length < 0 {
            return Err(ProtocolError::NegativeLength(length));
        }
        Ok(Self {
            cmd: bytes[0],
            length,
        })
    }

    /// Writes the header into the first [`HEADER_LEN`] bytes of `dst`.
    ///
    /// # Panics
    /// Panics if `dst` is shorter than [`HEADER_LEN`].
    pub fn write(&self, dst: &mut [u8]) {
        dst[0] = self.cmd;
        dst[1..HEADER_LEN].copy_from_slice(&self.length.to_le_bytes());
    }

    /// Payload length as a `usize`. Only valid for headers produced by
    /// [`read`](Self::read), which rejects negative lengths.
    pub fn payload_len(&self) -> usize {
        self.length as usize
    }

    /// Total packet length: header plus payload.
    pub fn packet_len(&self) -> usize {
        HEADER_LEN + self.payload_len()
    }
}

/// Where a packet's payload sits inside a byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    /// Command id from the header.
    pub cmd: u8,
    /// Payload length from the header.
    pub payload_len: usize,
    /// Offset of the first payload byte (always [`HEADER_LEN`]).
    pub payload_offset: usize,
}

/// Encodes `cmd` and `payload` into a freshly allocated packet.
///
/// The codec enforces no length limit; callers must keep payloads within
/// what their transport can carry.
pub fn encode(cmd: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; HEADER_LEN + payload.len()];
    encode_into(cmd, payload, &mut buf);
    buf
}

/// Encodes a packet into the front of `dst` and returns the number of bytes
/// written. `dst` may be longer than the packet (pooled buffers usually are).
///
/// # Panics
/// Panics if `dst` is shorter than `HEADER_LEN + payload.len()`.
pub fn encode_into(cmd: u8, payload: &[u8], dst: &mut [u8]) -> usize {
    let header = PacketHeader {
        cmd,
        length: payload.len() as i32,
    };
    header.write(dst);
    let end = HEADER_LEN + payload.len();
    dst[HEADER_LEN..end].copy_from_slice(payload);
    end
}

/// Reads the header at the start of `bytes` and reports where the payload is.
///
/// This does not check that the payload bytes are present. Use
/// [`split`] when the whole packet is expected to be in `bytes`.
///
/// # Errors
/// Same as [`PacketHeader::read`].
pub fn decode(bytes: &[u8]) -> Result<Decoded, ProtocolError> {
    let header = PacketHeader::read(bytes)?;
    Ok(Decoded {
        cmd: header.cmd,
        payload_len: header.payload_len(),
        payload_offset: HEADER_LEN,
    })
}

/// Decodes exactly one packet from `bytes`, returning the command id and the
/// payload slice. Trailing bytes after the payload are ignored.
///
/// # Errors
/// [`ProtocolError::Truncated`] if `bytes` holds less than the full packet.
pub fn split(bytes: &[u8]) -> Result<(u8, &[u8]), ProtocolError> {
    let header = PacketHeader::read(bytes)?;
    let end = header.packet_len();
    if bytes.len() < end {
        return Err(ProtocolError::Truncated {
            needed: end,
            available: bytes.len(),
        });
    }
    Ok((header.cmd, &bytes[HEADER_LEN..end]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_writes_cmd_then_le_length() {
        let bytes = encode(7, &[0xAA, 0xBB]);
        assert_eq!(bytes, vec![7, 2, 0, 0, 0, 0xAA, 0xBB]);
    }

    #[test]
    fn test_split_recovers_payload_for_various_lengths() {
        let large: Vec<u8> = (0..8192u32).map(|i| (i % 251) as u8).collect();
        for payload in [&[][..], &[42][..], &large[..]] {
            let bytes = encode(3, payload);
            let (cmd, body) = split(&bytes).unwrap();
            assert_eq!(cmd, 3);
            assert_eq!(body, payload);
        }
    }

    #[test]
    fn test_decode_reports_offset_and_length() {
        let bytes = encode(9, b"hello");
        let decoded = decode(&bytes).unwrap();
        assert_eq!(
            decoded,
            Decoded {
                cmd: 9,
                payload_len: 5,
                payload_offset: HEADER_LEN,
            }
        );
    }

    #[test]
    fn test_decode_short_header_is_truncated() {
        let err = decode(&[1, 0, 0]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Truncated {
                needed: 5,
                available: 3
            }
        ));
    }

    #[test]
    fn test_split_missing_payload_is_truncated() {
        let mut bytes = encode(1, &[1, 2, 3, 4]);
        bytes.truncate(7);
        assert!(matches!(
            split(&bytes),
            Err(ProtocolError::Truncated {
                needed: 9,
                available: 7
            })
        ));
    }

    #[test]
    fn test_negative_length_is_rejected() {
        let mut bytes = [0u8; 5];
        bytes[1..5].copy_from_slice(&(-1i32).to_le_bytes());
        assert!(matches!(
            PacketHeader::read(&bytes),
            Err(ProtocolError::NegativeLength(-1))
        ));
    }

    #[test]
    fn test_encode_into_larger_buffer_leaves_tail_untouched() {
        let mut dst = [0xFFu8; 16];
        let written = encode_into(2, &[5, 6], &mut dst);
        assert_eq!(written, 7);
        assert_eq!(&dst[..7], &[2, 2, 0, 0, 0, 5, 6]);
        assert!(dst[7..].iter().all(|b| *b == 0xFF));
    }
}
