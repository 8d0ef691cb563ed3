//! Transport layer for the lockstep server.
//!
//! Two listeners share the packet framing from `lockstep-protocol` and one
//! [`BufferPool`]:
//!
//! - [`LobbyTransport`]: reliable ordered TCP stream, one reader and one
//!   writer task per connection. Partial packets are buffered per
//!   connection until complete.
//! - [`BattleTransport`]: KCP over UDP, one poll loop for every peer. Each
//!   KCP message is exactly one packet.
//!
//! Both deliver inbound packets to a [`PacketHandler`] and accept outbound
//! packets through [`PacketSink`]. Sends never block: they encode into a
//! pooled buffer and hand it to the connection's writer.

mod battle;
mod codec;
mod error;
mod lobby;
mod pool;

pub use battle::{BattleTransport, KcpSettings};
pub use codec::{Packet, PacketDecoder};
pub use error::TransportError;
pub use lobby::{LobbyConfig, LobbySender, LobbyTransport};
pub use pool::{BufferPool, MAX_QUEUE_LEN, PoolConfig, PoolStats, Release};

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use lockstep_protocol::ProtocolError;

/// Counter shared by both transports so connection ids never collide.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection on either channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a `ConnectionId` from a raw `u64`.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates a fresh, process-unique id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Outbound side of a transport.
///
/// Implementations queue the encoded packet and return immediately, so this
/// is safe to call while holding a room or directory lock.
pub trait PacketSink: Send + Sync + 'static {
    /// Encodes `cmd` + `payload` and queues it for `conn`.
    ///
    /// # Errors
    /// [`TransportError::UnknownConnection`] if `conn` isn't open,
    /// [`TransportError::NotRunning`] if the transport is stopped.
    fn send_packet(
        &self,
        conn: ConnectionId,
        cmd: u8,
        payload: &[u8],
    ) -> Result<(), TransportError>;

    /// Closes `conn`. Unknown ids are ignored.
    fn disconnect(&self, conn: ConnectionId);
}

/// Inbound side of a transport: the callbacks a listener drives.
///
/// Callbacks run on the transport's own tasks and must not block.
pub trait PacketHandler: Send + Sync + 'static {
    /// A peer connected.
    fn on_connected(&self, conn: ConnectionId, addr: SocketAddr) {
        let _ = (conn, addr);
    }

    /// One complete packet arrived.
    ///
    /// # Errors
    /// Returning an error makes the transport close `conn`.
    fn on_packet(
        &self,
        conn: ConnectionId,
        cmd: u8,
        payload: &[u8],
    ) -> Result<(), ProtocolError>;

    /// `conn` is gone, whichever side closed it.
    fn on_disconnected(&self, conn: ConnectionId) {
        let _ = conn;
    }

    /// A read, write or decode failure on `conn`. The transport closes the
    /// connection right after this returns.
    fn on_error(&self, conn: ConnectionId, error: &TransportError) {
        tracing::debug!(%conn, %error, "transport error");
    }
}

/// Maps IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) back to IPv4.
pub fn canonical_addr(addr: SocketAddr) -> SocketAddr {
    SocketAddr::new(addr.ip().to_canonical(), addr.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_next_is_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.into_inner() > a.into_inner());
    }

    #[test]
    fn test_canonical_addr_unmaps_ipv4() {
        let mapped: SocketAddr = "[::ffff:10.0.0.5]:4000".parse().unwrap();
        assert_eq!(
            canonical_addr(mapped),
            "10.0.0.5:4000".parse::<SocketAddr>().unwrap()
        );
        let v6: SocketAddr = "[2001:db8::1]:4000".parse().unwrap();
        assert_eq!(canonical_addr(v6), v6);
    }
}
