//! # Lockstep
//!
//! An authoritative server for two-player deterministic-lockstep battles.
//!
//! Clients log in and match up over the **lobby** channel (TCP, port
//! 10085 by default). Once a room has both players, they move to the
//! **battle** channel (KCP over UDP, port 10086), send `Ready`, and the
//! room starts ticking: every 33 ms it broadcasts one authoritative frame
//! holding each player's input byte for that frame.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lockstep::prelude::*;
//!
//! # async fn run() -> Result<(), LockstepError> {
//! let server = LockstepServer::<AcceptAll, BincodeCodec>::builder().build(AcceptAll).await?;
//! let handle = server.handle();
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     handle.shutdown();
//! });
//! server.run().await
//! # }
//! ```

mod battle;
mod config;
mod error;
mod lobby;
mod server;
mod state;

pub use battle::BattleService;
pub use config::ServerConfig;
pub use error::LockstepError;
pub use lobby::{BattleEndpoint, LobbyService};
pub use server::{LockstepServer, LockstepServerBuilder, ServerHandle};
pub use state::ServerState;

/// The types most servers need.
pub mod prelude {
    pub use crate::{LockstepError, LockstepServer, LockstepServerBuilder, ServerConfig, ServerHandle};
    pub use lockstep_protocol::{
        BattleCommand, BattleErrorCode, BincodeCodec, Codec, LobbyCommand, LobbyErrorCode,
        PlayerId, RoomId,
    };
    pub use lockstep_room::{BattleConfig, RoomState};
    pub use lockstep_session::{AcceptAll, Authenticator, SessionError};
    pub use lockstep_tick::{TickConfig, TickPolicy};
    pub use lockstep_transport::{KcpSettings, PoolConfig};
}
