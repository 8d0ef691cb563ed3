//! Stream reassembly for the lobby channel.
//!
//! TCP delivers a byte stream, not packets: one read may carry half a header
//! or three packets back to back. [`PacketDecoder`] plugs into
//! `tokio_util::codec::FramedRead`, which owns a per-connection read buffer
//! and calls [`Decoder::decode`] until no complete packet remains.

use bytes::{Buf, Bytes, BytesMut};
use lockstep_protocol::{HEADER_LEN, PacketHeader};
use tokio_util::codec::Decoder;

use crate::TransportError;

/// One complete inbound packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub cmd: u8,
    pub payload: Bytes,
}

/// Splits a byte stream into [`Packet`]s.
#[derive(Debug, Clone, Copy)]
pub struct PacketDecoder {
    max_payload: usize,
}

impl PacketDecoder {
    /// A decoder that rejects payloads larger than `max_payload` bytes.
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }
}

impl Decoder for PacketDecoder {
    type Item = Packet;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, TransportError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let header = PacketHeader::read(&src[..HEADER_LEN])?;
        let len = header.payload_len();
        if len > self.max_payload {
            return Err(TransportError::PacketTooLarge {
                len,
                max: self.max_payload,
            });
        }

        let total = header.packet_len();
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(total);
        frame.advance(HEADER_LEN);
        Ok(Some(Packet {
            cmd: header.cmd,
            payload: frame.freeze(),
        }))
    }
}
