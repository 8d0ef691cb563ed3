//! Player identity for the lockstep server.
//!
//! 1. **Authentication**: deciding whether a login is allowed
//!    ([`Authenticator`]).
//! 2. **Directory**: the lookup tables from account to player, player to
//!    lobby and battle connections, and player to room
//!    ([`SessionDirectory`]).
//!
//! ```text
//! Engine (above)      ← resolves "who sent this?" and "where do I send?"
//!     ↕
//! Session (this crate)
//!     ↕
//! Protocol / Transport (below) ← PlayerId, RoomId, ConnectionId
//! ```

mod auth;
mod directory;
mod error;

pub use auth::{AcceptAll, Authenticator};
pub use directory::{DirectoryConfig, LoginOutcome, PlayerRecord, SessionDirectory};
pub use error::SessionError;
