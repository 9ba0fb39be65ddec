use serde_derive::{Deserialize, Serialize};
use serdeconv;
use std::env;
use std::net::Ipv4Addr;
use std::path::Path;

/// Environment variable overriding the auth backend connection secret, so it
/// stays out of the config file.
pub const AUTH_URI_ENV: &str = "BRIDLEPOINT_AUTH_URI";

/// One listen or advertisement endpoint.
#[derive(Serialize, Deserialize, Clone)]
pub struct Listen {
    pub address: String,
    pub port: u16,
}

impl Listen {
    fn new(address: &str, port: u16) -> Listen {
        Listen {
            address: address.to_string(),
            port,
        }
    }

    /// `address:port` for binding a listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// The address packed for the wire: the four octets in network order,
    /// read as a little-endian u32 by the stream codec.
    pub fn wire_addr(&self) -> u32 {
        let ip: Ipv4Addr = self.address.parse().unwrap_or(Ipv4Addr::LOCALHOST);
        u32::from_le_bytes(ip.octets())
    }
}

#[derive(Serialize, Deserialize, Clone)]
pub struct General {
    pub brand: String,
    pub motd: String,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Authentication {
    /// "local" is the only backend shipped with the server.
    pub backend: String,
    /// Connection secret for external backends; overridden by
    /// `BRIDLEPOINT_AUTH_URI` when set.
    pub connection_uri: String,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Data {
    /// Root of the per-kind record directories.
    pub root: String,
}

/// Endpoints the lobby hands out to clients. These are the addresses the
/// *client* connects to, which may differ from the listen addresses behind
/// NAT.
#[derive(Serialize, Deserialize, Clone)]
pub struct Advertisement {
    pub ranch: Listen,
    pub race: Listen,
    pub messenger: Listen,
    pub all_chat: Listen,
    pub private_chat: Listen,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Lobby {
    pub listen: Listen,
    pub advertisement: Advertisement,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Subserver {
    pub listen: Listen,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct GameConfig {
    pub general: General,
    pub authentication: Authentication,
    pub data: Data,
    pub lobby: Lobby,
    pub ranch: Subserver,
    pub race: Subserver,
    pub messenger: Subserver,
    pub all_chat: Subserver,
    pub private_chat: Subserver,
}

impl Default for GameConfig {
    fn default() -> GameConfig {
        GameConfig {
            general: General {
                brand: "Bridlepoint".to_string(),
                motd: "Welcome to Bridlepoint!".to_string(),
            },
            authentication: Authentication {
                backend: "local".to_string(),
                connection_uri: String::new(),
            },
            data: Data {
                root: "./data".to_string(),
            },
            lobby: Lobby {
                listen: Listen::new("0.0.0.0", 10030),
                advertisement: Advertisement {
                    ranch: Listen::new("127.0.0.1", 10031),
                    race: Listen::new("127.0.0.1", 10032),
                    messenger: Listen::new("127.0.0.1", 10033),
                    all_chat: Listen::new("127.0.0.1", 10034),
                    private_chat: Listen::new("127.0.0.1", 10035),
                },
            },
            ranch: Subserver {
                listen: Listen::new("0.0.0.0", 10031),
            },
            race: Subserver {
                listen: Listen::new("0.0.0.0", 10032),
            },
            messenger: Subserver {
                listen: Listen::new("0.0.0.0", 10033),
            },
            all_chat: Subserver {
                listen: Listen::new("0.0.0.0", 10034),
            },
            private_chat: Subserver {
                listen: Listen::new("0.0.0.0", 10035),
            },
        }
    }
}

impl GameConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<GameConfig, serdeconv::Error> {
        let mut config: GameConfig = serdeconv::from_toml_file(path)?;
        config.apply_environment();
        Ok(config)
    }

    /// Secrets come from the environment when present.
    pub fn apply_environment(&mut self) {
        if let Ok(uri) = env::var(AUTH_URI_ENV) {
            self.authentication.connection_uri = uri;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_plan() {
        let config = GameConfig::default();

        assert_eq!(config.lobby.listen.port, 10030);
        assert_eq!(config.ranch.listen.port, 10031);
        assert_eq!(config.race.listen.port, 10032);
        assert_eq!(config.messenger.listen.port, 10033);
        assert_eq!(config.all_chat.listen.port, 10034);
        assert_eq!(config.private_chat.listen.port, 10035);
        assert_eq!(config.lobby.advertisement.race.port, config.race.listen.port);
    }

    #[test]
    fn test_wire_addr_is_octet_order() {
        let listen = Listen::new("10.1.2.3", 10032);

        // Written little-endian, the bytes on the wire come out 10,1,2,3.
        assert_eq!(listen.wire_addr().to_le_bytes(), [10, 1, 2, 3]);
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = GameConfig::default();
        let toml = serdeconv::to_toml_string(&config).unwrap();
        let back: GameConfig = serdeconv::from_toml_str(&toml).unwrap();

        assert_eq!(back.lobby.listen.port, config.lobby.listen.port);
        assert_eq!(back.general.brand, config.general.brand);
    }
}
