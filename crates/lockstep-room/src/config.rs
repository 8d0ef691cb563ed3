//! Battle configuration and the room state machine.

use std::fmt;

use lockstep_tick::TickConfig;

// ---------------------------------------------------------------------------
// BattleConfig
// ---------------------------------------------------------------------------

/// Settings shared by every room a [`RoomManager`](crate::RoomManager)
/// creates.
#[derive(Debug, Clone, PartialEq)]
pub struct BattleConfig {
    /// Members per room. The battle starts when this many are ready.
    pub max_players: usize,

    /// Frame capacity. Inputs at or past this index are rejected and the
    /// room closes once the authoritative frame reaches it.
    pub max_frames: usize,

    /// Cadence of the authoritative tick.
    pub tick: TickConfig,
}

impl BattleConfig {
    /// Input masks are one byte, so a room seats at most eight players.
    pub const MAX_SEATS: usize = 8;

    /// Returns a copy with `max_players` clamped to `1..=MAX_SEATS` and
    /// `max_frames` to at least 1.
    pub fn validated(mut self) -> Self {
        self.max_players = self.max_players.clamp(1, Self::MAX_SEATS);
        self.max_frames = self.max_frames.max(1);
        self.tick = self.tick.validated();
        self
    }
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            max_players: 2,
            max_frames: 10_000,
            tick: TickConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// RoomState
// ---------------------------------------------------------------------------

/// The lifecycle state of a room.
///
/// ```text
/// Created → WaitingReady → Running → Closed
/// ```
///
/// - **Created**: the room exists and is accepting members.
/// - **WaitingReady**: every member slot is taken; waiting for each member
///   to send `Ready`.
/// - **Running**: the authoritative tick is live.
/// - **Closed**: terminal. The tick task is cancelled and every battle
///   command is refused. Reachable from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    Created,
    WaitingReady,
    Running,
    Closed,
}

impl RoomState {
    /// Returns `true` if the room is accepting new members.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Created)
    }

    /// Returns `true` while the tick is live.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// The next state in the forward order, or `None` from `Closed`.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Created => Some(Self::WaitingReady),
            Self::WaitingReady => Some(Self::Running),
            Self::Running => Some(Self::Closed),
            Self::Closed => None,
        }
    }

    /// Returns `true` if moving to `target` is valid: one step forward, or
    /// straight to `Closed` from anywhere but `Closed`.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target) || (target == Self::Closed && self != Self::Closed)
    }
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::WaitingReady => write!(f, "WaitingReady"),
            Self::Running => write!(f, "Running"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_room_state_next_follows_strict_order() {
        assert_eq!(RoomState::Created.next(), Some(RoomState::WaitingReady));
        assert_eq!(RoomState::WaitingReady.next(), Some(RoomState::Running));
        assert_eq!(RoomState::Running.next(), Some(RoomState::Closed));
        assert_eq!(RoomState::Closed.next(), None);
    }

    #[test]
    fn test_room_state_can_transition_to() {
        assert!(RoomState::Created.can_transition_to(RoomState::WaitingReady));
        assert!(!RoomState::Created.can_transition_to(RoomState::Running));
        assert!(RoomState::Created.can_transition_to(RoomState::Closed));
        assert!(RoomState::WaitingReady.can_transition_to(RoomState::Closed));
        assert!(!RoomState::Running.can_transition_to(RoomState::Created));
        assert!(!RoomState::Closed.can_transition_to(RoomState::Closed));
    }

    #[test]
    fn test_room_state_is_joinable() {
        assert!(RoomState::Created.is_joinable());
        assert!(!RoomState::WaitingReady.is_joinable());
        assert!(!RoomState::Running.is_joinable());
        assert!(!RoomState::Closed.is_joinable());
    }

    #[test]
    fn test_room_state_display() {
        assert_eq!(RoomState::WaitingReady.to_string(), "WaitingReady");
        assert_eq!(RoomState::Closed.to_string(), "Closed");
    }

    #[test]
    fn test_battle_config_defaults() {
        let cfg = BattleConfig::default();
        assert_eq!(cfg.max_players, 2);
        assert_eq!(cfg.max_frames, 10_000);
        assert_eq!(cfg.tick.interval, Duration::from_millis(33));
    }

    #[test]
    fn test_battle_config_validated_clamps_seats() {
        let cfg = BattleConfig {
            max_players: 20,
            max_frames: 0,
            ..BattleConfig::default()
        }
        .validated();
        assert_eq!(cfg.max_players, BattleConfig::MAX_SEATS);
        assert_eq!(cfg.max_frames, 1);

        let cfg = BattleConfig {
            max_players: 0,
            ..BattleConfig::default()
        }
        .validated();
        assert_eq!(cfg.max_players, 1);
    }
}
