//! Server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use lockstep_room::BattleConfig;
use lockstep_session::DirectoryConfig;
use lockstep_transport::{KcpSettings, LobbyConfig, PoolConfig};

/// Everything the server needs to start. Defaults match the stock client.
///
/// Override fields with struct update syntax:
///
/// ```rust
/// use lockstep::ServerConfig;
///
/// let config = ServerConfig {
///     lobby_port: 0,
///     battle_port: 0,
///     ..ServerConfig::default()
/// };
/// assert_eq!(config.player_id_base, 100);
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the lobby listener binds. The battle listener always binds
    /// the unspecified address.
    pub listen_addr: IpAddr,
    pub lobby_port: u16,
    pub battle_port: u16,
    /// The first player to log in gets `player_id_base + 1`.
    pub player_id_base: u32,
    /// The first room created gets `room_id_base + 1`.
    pub room_id_base: u32,
    pub lobby: LobbyConfig,
    pub pool: PoolConfig,
    pub kcp: KcpSettings,
    pub battle: BattleConfig,
}

impl ServerConfig {
    /// Where the lobby listener binds.
    pub fn lobby_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.lobby_port)
    }

    pub(crate) fn directory(&self) -> DirectoryConfig {
        DirectoryConfig {
            player_id_base: self.player_id_base,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            lobby_port: 10085,
            battle_port: 10086,
            player_id_base: 100,
            room_id_base: 10_000,
            lobby: LobbyConfig::default(),
            pool: PoolConfig::default(),
            kcp: KcpSettings::default(),
            battle: BattleConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports_and_bases() {
        let config = ServerConfig::default();
        assert_eq!(config.lobby_addr(), "127.0.0.1:10085".parse().unwrap());
        assert_eq!(config.battle_port, 10086);
        assert_eq!(config.directory().player_id_base, 100);
        assert_eq!(config.room_id_base, 10_000);
        assert_eq!(config.battle.max_players, 2);
    }
}
