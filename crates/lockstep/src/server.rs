//! `LockstepServer` builder and server loop.
//!
//! This is the entry point for running the battle server. It ties the
//! layers together: transport → protocol → session → room.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use lockstep_protocol::{BincodeCodec, Codec};
use lockstep_room::{BattleConfig, RoomManager};
use lockstep_session::Authenticator;
use lockstep_transport::{
    BattleTransport, BufferPool, KcpSettings, LobbySender, LobbyTransport, TransportError,
};

use crate::{BattleEndpoint, BattleService, LobbyService, LockstepError, ServerConfig, ServerState};

/// Starts the battle transport with the battle service as its handler.
struct BattleLauncher<A: Authenticator, C: Codec> {
    transport: BattleTransport,
    port: u16,
    service: Arc<BattleService<A, C, BattleTransport>>,
}

impl<A: Authenticator, C: Codec> BattleEndpoint for BattleLauncher<A, C> {
    fn is_active(&self) -> bool {
        self.transport.is_active()
    }

    fn start(&self) -> Result<SocketAddr, TransportError> {
        self.transport.start(self.port, Arc::clone(&self.service))
    }
}

type Lobby<A, C> = LobbyService<A, C, LobbySender, BattleLauncher<A, C>>;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a lockstep server.
///
/// # Example
///
/// ```rust,no_run
/// use lockstep::prelude::*;
///
/// # async fn run() -> Result<(), LockstepError> {
/// let server = LockstepServer::<AcceptAll, BincodeCodec>::builder()
///     .listen("0.0.0.0".parse().unwrap())
///     .build(AcceptAll)
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct LockstepServerBuilder {
    config: ServerConfig,
}

impl LockstepServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address the lobby listener binds.
    pub fn listen(mut self, addr: IpAddr) -> Self {
        self.config.listen_addr = addr;
        self
    }

    pub fn lobby_port(mut self, port: u16) -> Self {
        self.config.lobby_port = port;
        self
    }

    pub fn battle_port(mut self, port: u16) -> Self {
        self.config.battle_port = port;
        self
    }

    pub fn battle(mut self, battle: BattleConfig) -> Self {
        self.config.battle = battle;
        self
    }

    pub fn kcp(mut self, kcp: KcpSettings) -> Self {
        self.config.kcp = kcp;
        self
    }

    /// Binds the lobby listener and wires up both services. The battle
    /// listener starts later, when the first room fills up.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<LockstepServer<A, BincodeCodec>, LockstepError> {
        self.build_with_codec(auth, BincodeCodec).await
    }

    /// Like [`build`](Self::build) with a custom message body codec.
    pub async fn build_with_codec<A: Authenticator, C: Codec>(
        self,
        auth: A,
        codec: C,
    ) -> Result<LockstepServer<A, C>, LockstepError> {
        let config = self.config;
        let pool = Arc::new(BufferPool::new(&config.pool));
        let lobby =
            LobbyTransport::bind(config.lobby_addr(), config.lobby.clone(), Arc::clone(&pool))
                .await?;
        let battle = BattleTransport::new(config.kcp.clone(), pool);

        let state = Arc::new(ServerState::new(&config, auth, codec));
        let battle_service = Arc::new(BattleService::new(
            Arc::clone(&state),
            Arc::new(battle.clone()),
        ));
        let launcher = Arc::new(BattleLauncher {
            transport: battle.clone(),
            port: config.battle_port,
            service: battle_service,
        });
        let lobby_service = Arc::new(LobbyService::new(
            Arc::clone(&state),
            Arc::new(lobby.sender()),
            launcher,
        ));

        Ok(LockstepServer {
            lobby,
            lobby_service,
            battle,
            state,
        })
    }
}

impl Default for LockstepServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A lockstep battle server with its lobby listener bound.
///
/// Call [`run()`](Self::run) to start accepting lobby connections.
pub struct LockstepServer<A: Authenticator, C: Codec> {
    lobby: LobbyTransport,
    lobby_service: Arc<Lobby<A, C>>,
    battle: BattleTransport,
    state: Arc<ServerState<A, C>>,
}

impl<A: Authenticator, C: Codec> LockstepServer<A, C> {
    /// Creates a new builder.
    pub fn builder() -> LockstepServerBuilder {
        LockstepServerBuilder::new()
    }

    /// Returns the address the lobby listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, LockstepError> {
        Ok(self.lobby.local_addr()?)
    }

    /// The battle listener. Inactive until the first room fills up.
    pub fn battle(&self) -> &BattleTransport {
        &self.battle
    }

    pub fn state(&self) -> &Arc<ServerState<A, C>> {
        &self.state
    }

    /// A handle that can stop the server from another task.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            lobby: self.lobby.sender(),
            battle: self.battle.clone(),
            rooms: Arc::clone(&self.state.rooms),
        }
    }

    /// Accepts lobby connections until [`ServerHandle::shutdown`] is
    /// called, then stops the battle listener and every room.
    pub async fn run(self) -> Result<(), LockstepError> {
        tracing::info!(
            lobby = ?self.lobby.local_addr().ok(),
            "lockstep server running"
        );
        let handle = self.handle();
        self.lobby.run(self.lobby_service).await;
        handle.shutdown();
        Ok(())
    }
}

/// Stops a running [`LockstepServer`].
#[derive(Clone)]
pub struct ServerHandle {
    lobby: LobbySender,
    battle: BattleTransport,
    rooms: Arc<RoomManager>,
}

impl ServerHandle {
    /// Stops both listeners, closes every connection, and stops every
    /// room's tick. Safe to call more than once.
    pub fn shutdown(&self) {
        self.lobby.shutdown();
        self.battle.shutdown();
        self.rooms.shutdown();
    }

    pub fn is_shut_down(&self) -> bool {
        self.lobby.is_shut_down()
    }
}
