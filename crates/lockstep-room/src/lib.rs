//! Battle rooms for the lockstep server.
//!
//! A room collects two players, waits for both to send `Ready`, then runs
//! an authoritative tick: every interval it broadcasts one frame holding
//! each seat's latest input byte for that frame, whether or not input
//! arrived.
//!
//! # Key types
//!
//! - [`Room`]: membership, readiness, seats, inputs, consistency checks
//! - [`RoomSlot`]: a room behind its lock, plus its tick task
//! - [`RoomManager`]: creates and looks up rooms
//! - [`RoomState`]: lifecycle state machine
//! - [`BattleConfig`]: room size, frame capacity, tick cadence

mod config;
mod error;
mod manager;
mod room;
mod slot;

pub use config::{BattleConfig, RoomState};
pub use error::RoomError;
pub use manager::RoomManager;
pub use room::{
    CheckVerdict, DisconnectOutcome, JoinOutcome, NOT_STARTED, ReadyOutcome, Room, TickOutput,
};
pub use slot::RoomSlot;
