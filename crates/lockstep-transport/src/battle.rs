//! Battle transport: KCP over UDP.
//!
//! One poll task owns the UDP socket and every peer's KCP state machine.
//! It wakes on three things:
//!
//! - an inbound datagram, fed to the sending peer's KCP session. Every
//!   complete KCP message is exactly one packet and is dispatched at once;
//! - a queued command (send or disconnect) from a [`PacketSink`] caller;
//! - the poll interval, which drives `Kcp::update` (retransmits, ACKs and
//!   flushing queued sends) and reaps idle peers.
//!
//! Peers are identified by source address. A new address, or a known
//! address presenting a different conversation id, opens a new connection.
//!
//! A decode failure closes only the offending connection. A socket error
//! stops the whole transport.

use std::collections::HashMap;
use std::io::{self, Write};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use kcp::Kcp;
use lockstep_protocol::{HEADER_LEN, header};
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    BufferPool, ConnectionId, PacketHandler, PacketSink, TransportError, canonical_addr,
};

/// KCP segment header length; shorter datagrams can't carry a conv id.
const KCP_HEADER_LEN: usize = 24;

/// Largest datagram the poll loop reads.
const MAX_DATAGRAM: usize = 64 * 1024;

/// KCP profile for the battle channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KcpSettings {
    /// Bind `[::]` (accepting IPv4 too) instead of `0.0.0.0`.
    pub dual_stack: bool,
    pub no_delay: bool,
    /// Poll and update cadence.
    pub interval: Duration,
    /// Duplicate ACKs before a fast retransmit. 0 disables.
    pub fast_resend: i32,
    pub congestion_control: bool,
    pub send_window: u16,
    pub recv_window: u16,
    pub mtu: usize,
    /// A peer silent for this long is disconnected.
    pub idle_timeout: Duration,
}

impl Default for KcpSettings {
    fn default() -> Self {
        Self {
            dual_stack: true,
            no_delay: true,
            interval: Duration::from_millis(1),
            fast_resend: 2,
            congestion_control: false,
            send_window: 1024,
            recv_window: 1024,
            mtu: 1200,
            idle_timeout: Duration::from_secs(10),
        }
    }
}

enum Command {
    Send {
        conn: ConnectionId,
        buf: Vec<u8>,
        len: usize,
    },
    Disconnect(ConnectionId),
}

struct Running {
    generation: u64,
    cancel: CancellationToken,
    commands: mpsc::UnboundedSender<Command>,
    local_addr: SocketAddr,
}

struct Shared {
    settings: KcpSettings,
    pool: Arc<BufferPool>,
    running: Mutex<Option<Running>>,
    peers: Mutex<HashMap<ConnectionId, SocketAddr>>,
    generations: Mutex<u64>,
}

/// Cloneable handle to the battle listener.
///
/// Created stopped; [`start`](Self::start) binds the socket and spawns the
/// poll task.
#[derive(Clone)]
pub struct BattleTransport {
    shared: Arc<Shared>,
}

impl BattleTransport {
    pub fn new(settings: KcpSettings, pool: Arc<BufferPool>) -> Self {
        Self {
            shared: Arc::new(Shared {
                settings,
                pool,
                running: Mutex::new(None),
                peers: Mutex::new(HashMap::new()),
                generations: Mutex::new(0),
            }),
        }
    }

    /// Binds `port` and starts the poll task. Calling this while already
    /// running is a no-op that returns the bound address.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<H: PacketHandler>(
        &self,
        port: u16,
        handler: Arc<H>,
    ) -> Result<SocketAddr, TransportError> {
        let mut running = self.shared.running.lock();
        if let Some(current) = running.as_ref() {
            return Ok(current.local_addr);
        }

        let ip = if self.shared.settings.dual_stack {
            Ipv6Addr::UNSPECIFIED.into()
        } else {
            Ipv4Addr::UNSPECIFIED.into()
        };
        let std_socket = std::net::UdpSocket::bind(SocketAddr::new(ip, port))
            .map_err(TransportError::BindFailed)?;
        std_socket
            .set_nonblocking(true)
            .map_err(TransportError::BindFailed)?;
        let socket = UdpSocket::from_std(std_socket).map_err(TransportError::BindFailed)?;
        let local_addr = socket.local_addr().map_err(TransportError::BindFailed)?;

        let generation = {
            let mut generations = self.shared.generations.lock();
            *generations += 1;
            *generations
        };
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        *running = Some(Running {
            generation,
            cancel: cancel.clone(),
            commands: tx,
            local_addr,
        });
        drop(running);

        let poller = Poller {
            socket: Arc::new(socket),
            shared: Arc::clone(&self.shared),
            handler,
            generation,
            sessions: HashMap::new(),
            by_conn: HashMap::new(),
            started: Instant::now(),
        };
        tokio::spawn(poller.run(cancel, rx));
        tracing::info!(%local_addr, "battle transport listening");
        Ok(local_addr)
    }

    /// `true` while the poll task is running.
    pub fn is_active(&self) -> bool {
        self.shared.running.lock().is_some()
    }

    /// The bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.running.lock().as_ref().map(|r| r.local_addr)
    }

    /// The remote address of `conn`, with IPv4-mapped addresses unmapped.
    pub fn client_address(&self, conn: ConnectionId) -> Option<SocketAddr> {
        self.shared.peers.lock().get(&conn).copied().map(canonical_addr)
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.shared.peers.lock().len()
    }

    /// Stops the poll task. Open connections are dropped and reported
    /// through `on_disconnected`.
    pub fn shutdown(&self) {
        if let Some(running) = self.shared.running.lock().take() {
            tracing::info!(local_addr = %running.local_addr, "battle transport shutting down");
            running.cancel.cancel();
        }
    }

    fn enqueue(&self, command: Command) -> Result<(), TransportError> {
        let running = self.shared.running.lock();
        let running = running.as_ref().ok_or(TransportError::NotRunning)?;
        running
            .commands
            .send(command)
            .map_err(|_| TransportError::NotRunning)
    }
}

impl PacketSink for BattleTransport {
    fn send_packet(
        &self,
        conn: ConnectionId,
        cmd: u8,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        if !self.is_active() {
            return Err(TransportError::NotRunning);
        }
        if !self.shared.peers.lock().contains_key(&conn) {
            return Err(TransportError::UnknownConnection(conn));
        }
        let mut buf = self.shared.pool.get(HEADER_LEN + payload.len());
        let len = header::encode_into(cmd, payload, &mut buf);
        self.enqueue(Command::Send { conn, buf, len })
    }

    fn disconnect(&self, conn: ConnectionId) {
        if self.enqueue(Command::Disconnect(conn)).is_err() {
            tracing::debug!(%conn, "disconnect ignored; battle transport not running");
        }
    }
}

// ---------------------------------------------------------------------------
// Poll loop
// ---------------------------------------------------------------------------

/// KCP output: each flushed segment becomes one datagram to the peer.
struct DatagramOutput {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl Write for DatagramOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.socket.try_send_to(buf, self.peer) {
            Ok(n) => Ok(n),
            // KCP retransmits; a full socket buffer is just loss.
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(buf.len()),
            Err(e) => Err(e),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Session {
    id: ConnectionId,
    conv: u32,
    kcp: Kcp<DatagramOutput>,
    last_seen: Instant,
}

struct Poller<H> {
    socket: Arc<UdpSocket>,
    shared: Arc<Shared>,
    handler: Arc<H>,
    generation: u64,
    sessions: HashMap<SocketAddr, Session>,
    by_conn: HashMap<ConnectionId, SocketAddr>,
    started: Instant,
}

impl<H: PacketHandler> Poller<H> {
    async fn run(
        mut self,
        cancel: CancellationToken,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        let socket = Arc::clone(&self.socket);
        let mut datagram = vec![0u8; MAX_DATAGRAM];
        let mut ticker = tokio::time::interval(self.shared.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = socket.recv_from(&mut datagram) => match received {
                    Ok((n, peer)) => self.on_datagram(&datagram[..n], peer),
                    Err(e) => {
                        let error = TransportError::ReceiveFailed(e);
                        tracing::error!(%error, "battle socket failed; stopping transport");
                        break;
                    }
                },
                Some(command) = commands.recv() => self.apply(command),
                _ = ticker.tick() => self.update(),
            }
        }

        self.teardown();
    }

    fn clock(&self) -> u32 {
        // KCP timestamps are u32 milliseconds and wrap.
        self.started.elapsed().as_millis() as u32
    }

    fn on_datagram(&mut self, data: &[u8], peer: SocketAddr) {
        if data.len() < KCP_HEADER_LEN {
            tracing::trace!(%peer, len = data.len(), "ignoring runt datagram");
            return;
        }
        let conv = kcp::get_conv(data);

        if let Some(stale) = self
            .sessions
            .get(&peer)
            .filter(|session| session.conv != conv)
            .map(|session| session.id)
        {
            tracing::debug!(conn = %stale, %peer, conv, "peer restarted with new conversation");
            self.close(stale);
        }
        if !self.sessions.contains_key(&peer) {
            self.open(peer, conv);
        }

        let Some(session) = self.sessions.get_mut(&peer) else {
            return;
        };
        session.last_seen = Instant::now();
        let id = session.id;
        if let Err(e) = session.kcp.input(data) {
            let error = TransportError::Kcp(e.to_string());
            tracing::debug!(conn = %id, %error, "bad kcp segment");
            self.handler.on_error(id, &error);
            self.close(id);
            return;
        }
        self.drain(peer);
    }

    /// Dispatches every complete message queued in `peer`'s session.
    fn drain(&mut self, peer: SocketAddr) {
        let Some(session) = self.sessions.get_mut(&peer) else {
            return;
        };
        let id = session.id;
        let mut failed = false;

        while let Ok(size) = session.kcp.peeksize() {
            let mut buf = self.shared.pool.get(size);
            let received = match session.kcp.recv(&mut buf) {
                Ok(n) => n,
                Err(e) => {
                    self.shared.pool.release(buf);
                    let error = TransportError::Kcp(e.to_string());
                    tracing::debug!(conn = %id, %error, "kcp recv failed");
                    self.handler.on_error(id, &error);
                    failed = true;
                    break;
                }
            };

            let dispatched = match header::split(&buf[..received]) {
                Ok((cmd, payload)) => {
                    tracing::trace!(conn = %id, cmd, len = payload.len(), "battle packet");
                    self.handler.on_packet(id, cmd, payload).map_err(|e| {
                        tracing::warn!(conn = %id, cmd, error = %e, "rejected battle packet");
                    })
                }
                Err(e) => {
                    let error = TransportError::Protocol(e);
                    tracing::debug!(conn = %id, %error, "undecodable battle packet");
                    self.handler.on_error(id, &error);
                    Err(())
                }
            };
            self.shared.pool.release(buf);
            if dispatched.is_err() {
                failed = true;
                break;
            }
        }

        if failed {
            self.close(id);
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Send { conn, buf, len } => {
                let session = self
                    .by_conn
                    .get(&conn)
                    .and_then(|peer| self.sessions.get_mut(peer));
                match session {
                    Some(session) => {
                        if let Err(e) = session.kcp.send(&buf[..len]) {
                            tracing::warn!(%conn, error = %e, "kcp send failed");
                        }
                    }
                    None => tracing::debug!(%conn, "dropping send to closed connection"),
                }
                self.shared.pool.release(buf);
            }
            Command::Disconnect(conn) => self.close(conn),
        }
    }

    fn update(&mut self) {
        let now = self.clock();
        let idle_timeout = self.shared.settings.idle_timeout;
        let mut dead = Vec::new();

        for session in self.sessions.values_mut() {
            if session.last_seen.elapsed() > idle_timeout {
                tracing::info!(conn = %session.id, "battle connection idle; closing");
                dead.push(session.id);
                continue;
            }
            if let Err(e) = session.kcp.update(now) {
                tracing::warn!(conn = %session.id, error = %e, "kcp update failed");
                dead.push(session.id);
            }
        }

        for conn in dead {
            self.close(conn);
        }
    }

    fn open(&mut self, peer: SocketAddr, conv: u32) {
        let settings = &self.shared.settings;
        let output = DatagramOutput {
            socket: Arc::clone(&self.socket),
            peer,
        };
        let mut kcp = Kcp::new(conv, output);
        kcp.set_nodelay(
            settings.no_delay,
            settings.interval.as_millis() as i32,
            settings.fast_resend,
            !settings.congestion_control,
        );
        kcp.set_wndsize(settings.send_window, settings.recv_window);
        if let Err(e) = kcp.set_mtu(settings.mtu) {
            tracing::warn!(mtu = settings.mtu, error = %e, "invalid kcp mtu; keeping default");
        }

        let id = ConnectionId::next();
        self.sessions.insert(
            peer,
            Session {
                id,
                conv,
                kcp,
                last_seen: Instant::now(),
            },
        );
        self.by_conn.insert(id, peer);
        self.shared.peers.lock().insert(id, peer);
        tracing::info!(%id, %peer, conv, "battle connection opened");
        self.handler.on_connected(id, canonical_addr(peer));
    }

    fn close(&mut self, conn: ConnectionId) {
        let Some(peer) = self.by_conn.remove(&conn) else {
            return;
        };
        self.sessions.remove(&peer);
        self.shared.peers.lock().remove(&conn);
        tracing::info!(%conn, %peer, "battle connection closed");
        self.handler.on_disconnected(conn);
    }

    fn teardown(&mut self) {
        let conns: Vec<ConnectionId> = self.by_conn.keys().copied().collect();
        for conn in conns {
            self.close(conn);
        }

        let mut running = self.shared.running.lock();
        if running
            .as_ref()
            .is_some_and(|r| r.generation == self.generation)
        {
            *running = None;
        }
        tracing::info!("battle transport stopped");
    }
}
