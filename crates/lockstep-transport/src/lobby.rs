//! Lobby transport: reliable ordered TCP.
//!
//! Each accepted connection gets two tasks:
//!
//! - a **reader** that feeds a `FramedRead<_, PacketDecoder>` and hands every
//!   complete packet to the [`PacketHandler`], in arrival order;
//! - a **writer** that drains the connection's outbound queue, writes the
//!   encoded prefix of each pooled buffer and returns the buffer to the pool.
//!
//! [`LobbySender`] is the cloneable handle the rest of the server uses to
//! reply, broadcast and close connections. Every task watches a child of the
//! transport's [`CancellationToken`], so [`LobbySender::shutdown`] stops the
//! accept loop and every connection at their next await point.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::StreamExt;
use lockstep_protocol::{HEADER_LEN, header};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use crate::{
    BufferPool, ConnectionId, PacketDecoder, PacketHandler, PacketSink, TransportError,
};

/// Tuning for the lobby listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyConfig {
    /// Initial capacity of each connection's read buffer.
    pub read_buffer: usize,
    /// Largest payload a client may announce before being disconnected.
    pub max_payload: usize,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            read_buffer: 1024,
            max_payload: 64 * 1024,
        }
    }
}

/// An encoded packet waiting for the writer. Only `buf[..len]` is sent.
struct Outbound {
    buf: Vec<u8>,
    len: usize,
}

struct ConnEntry {
    tx: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
    addr: SocketAddr,
}

struct Shared {
    conns: Mutex<HashMap<ConnectionId, ConnEntry>>,
    pool: Arc<BufferPool>,
    cancel: CancellationToken,
}

// ---------------------------------------------------------------------------
// LobbySender
// ---------------------------------------------------------------------------

/// Cloneable handle for sending to and closing lobby connections.
#[derive(Clone)]
pub struct LobbySender {
    shared: Arc<Shared>,
}

impl LobbySender {
    /// Ids of every open connection.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.shared.conns.lock().keys().copied().collect()
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.shared.conns.lock().len()
    }

    /// The remote address of `conn`, if it is open.
    pub fn peer_addr(&self, conn: ConnectionId) -> Option<SocketAddr> {
        self.shared.conns.lock().get(&conn).map(|entry| entry.addr)
    }

    /// Stops accepting and closes every open connection.
    pub fn shutdown(&self) {
        tracing::info!("lobby transport shutting down");
        self.shared.cancel.cancel();
    }

    /// `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }
}

impl PacketSink for LobbySender {
    fn send_packet(
        &self,
        conn: ConnectionId,
        cmd: u8,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let conns = self.shared.conns.lock();
        let entry = conns
            .get(&conn)
            .ok_or(TransportError::UnknownConnection(conn))?;

        let mut buf = self.shared.pool.get(HEADER_LEN + payload.len());
        let len = header::encode_into(cmd, payload, &mut buf);
        entry
            .tx
            .send(Outbound { buf, len })
            .map_err(|_| TransportError::UnknownConnection(conn))
    }

    fn disconnect(&self, conn: ConnectionId) {
        if let Some(entry) = self.shared.conns.lock().get(&conn) {
            tracing::debug!(%conn, "closing lobby connection");
            entry.cancel.cancel();
        }
    }
}

// ---------------------------------------------------------------------------
// LobbyTransport
// ---------------------------------------------------------------------------

/// A bound lobby listener. Call [`run`](Self::run) to start accepting.
pub struct LobbyTransport {
    listener: TcpListener,
    config: LobbyConfig,
    sender: LobbySender,
}

impl LobbyTransport {
    /// Binds the listener. No connection is accepted until `run`.
    pub async fn bind(
        addr: SocketAddr,
        config: LobbyConfig,
        pool: Arc<BufferPool>,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        tracing::info!(%addr, "lobby transport listening");
        Ok(Self {
            listener,
            config,
            sender: LobbySender {
                shared: Arc::new(Shared {
                    conns: Mutex::new(HashMap::new()),
                    pool,
                    cancel: CancellationToken::new(),
                }),
            },
        })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener
            .local_addr()
            .map_err(TransportError::BindFailed)
    }

    /// A handle for replying to and closing connections.
    pub fn sender(&self) -> LobbySender {
        self.sender.clone()
    }

    /// Accepts connections until the transport is shut down.
    pub async fn run<H: PacketHandler>(self, handler: Arc<H>) {
        let cancel = self.sender.shared.cancel.clone();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_connection(stream, addr, &handler),
                    Err(e) => {
                        let error = TransportError::AcceptFailed(e);
                        tracing::warn!(%error, "lobby accept failed");
                    }
                },
            }
        }
        tracing::info!("lobby transport stopped");
    }

    fn spawn_connection<H: PacketHandler>(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        handler: &Arc<H>,
    ) {
        let id = ConnectionId::next();
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%id, error = %e, "failed to set TCP_NODELAY");
        }
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = &self.sender.shared;
        let cancel = shared.cancel.child_token();
        shared.conns.lock().insert(
            id,
            ConnEntry {
                tx,
                cancel: cancel.clone(),
                addr,
            },
        );
        tracing::info!(%id, %addr, "lobby connection accepted");
        handler.on_connected(id, addr);

        tokio::spawn(write_loop(
            id,
            write_half,
            rx,
            Arc::clone(&shared.pool),
            cancel.clone(),
            Arc::clone(handler),
        ));

        let frames = FramedRead::with_capacity(
            read_half,
            PacketDecoder::new(self.config.max_payload),
            self.config.read_buffer,
        );
        tokio::spawn(read_loop(
            id,
            frames,
            Arc::clone(handler),
            Arc::clone(shared),
            cancel,
        ));
    }
}

async fn read_loop<H: PacketHandler>(
    id: ConnectionId,
    mut frames: FramedRead<OwnedReadHalf, PacketDecoder>,
    handler: Arc<H>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = frames.next() => next,
        };
        match next {
            Some(Ok(packet)) => {
                tracing::trace!(%id, cmd = packet.cmd, len = packet.payload.len(), "lobby packet");
                if let Err(e) = handler.on_packet(id, packet.cmd, &packet.payload) {
                    tracing::warn!(%id, cmd = packet.cmd, error = %e, "rejected lobby packet");
                    break;
                }
            }
            Some(Err(e)) => {
                tracing::error!(%id, error = %e, "lobby read failed");
                handler.on_error(id, &e);
                break;
            }
            None => {
                tracing::debug!(%id, "peer closed lobby connection");
                break;
            }
        }
    }

    cancel.cancel();
    shared.conns.lock().remove(&id);
    handler.on_disconnected(id);
    tracing::info!(%id, "lobby connection closed");
}

async fn write_loop<H: PacketHandler>(
    id: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    pool: Arc<BufferPool>,
    cancel: CancellationToken,
    handler: Arc<H>,
) {
    loop {
        let out = tokio::select! {
            _ = cancel.cancelled() => break,
            out = rx.recv() => match out {
                Some(out) => out,
                None => break,
            },
        };
        let written = writer.write_all(&out.buf[..out.len]).await;
        pool.release(out.buf);
        if let Err(e) = written {
            let error = TransportError::SendFailed(e);
            tracing::error!(%id, %error, "lobby write failed");
            handler.on_error(id, &error);
            cancel.cancel();
            break;
        }
    }
    let _ = writer.shutdown().await;
}
