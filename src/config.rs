//! Node configuration.

use std::fmt::{self, Display, Formatter};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::wire::constants::{
    MAINNET_MAGIC, MAINNET_PORT, NODE_SERVICES, PROTOCOL_VERSION, REGTEST_MAGIC, REGTEST_PORT,
    SIGNET_MAGIC, SIGNET_PORT, TESTNET3_MAGIC, TESTNET3_PORT,
};
use crate::wire::{NetAddr, VersionPayload};

/// Default capacity of both the inbound and the outbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Bitcoin network a peer belongs to, identified on the wire by its magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    Mainnet,
    Testnet3,
    Regtest,
    Signet,
}

impl Network {
    pub fn magic(self) -> u32 {
        match self {
            Network::Mainnet => MAINNET_MAGIC,
            Network::Testnet3 => TESTNET3_MAGIC,
            Network::Regtest => REGTEST_MAGIC,
            Network::Signet => SIGNET_MAGIC,
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Network::Mainnet => MAINNET_PORT,
            Network::Testnet3 => TESTNET3_PORT,
            Network::Regtest => REGTEST_PORT,
            Network::Signet => SIGNET_PORT,
        }
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "testnet3" | "test" => Ok(Network::Testnet3),
            "regtest" => Ok(Network::Regtest),
            "signet" => Ok(Network::Signet),
            other => Err(format!("unknown network: {other}")),
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Mainnet => "mainnet",
            Network::Testnet3 => "testnet",
            Network::Regtest => "regtest",
            Network::Signet => "signet",
        };
        f.write_str(name)
    }
}

/// What the session needs to know to speak for this node.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub network: Network,
    pub protocol_version: i32,
    pub services: u64,
    /// Raw user agent field, written verbatim.
    pub user_agent: Vec<u8>,
    pub start_height: i32,
    pub relay: bool,
    /// Remote address, advertised as `addr_recv` when known.
    pub peer_addr: Option<SocketAddr>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            protocol_version: PROTOCOL_VERSION,
            services: NODE_SERVICES,
            user_agent: vec![0],
            start_height: 0,
            relay: true,
            peer_addr: None,
        }
    }
}

impl SessionConfig {
    /// Builds a fresh `version` payload: current time, new random nonce.
    pub fn version_payload(&self) -> VersionPayload {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64);

        let addr_recv = self
            .peer_addr
            .map(|addr| NetAddr::from_socket_addr(self.services, addr))
            .unwrap_or_default();

        // We don't accept inbound connections, so there is nothing useful to
        // advertise about ourselves beyond our services.
        let addr_from = NetAddr {
            services: self.services,
            ..NetAddr::default()
        };

        VersionPayload {
            version: self.protocol_version,
            services: self.services,
            timestamp,
            addr_recv,
            addr_from,
            nonce: rand::thread_rng().r#gen(),
            user_agent: self.user_agent.clone(),
            start_height: self.start_height,
            relay: self.relay,
        }
    }
}

/// Complete node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Peer to connect to, `host[:port]`.
    pub peer: String,

    pub session: SessionConfig,

    pub rx_capacity: usize,
    pub tx_capacity: usize,

    pub connect_timeout: Duration,

    /// Read timeout on the socket. An idle peer past this is disconnected.
    pub idle_timeout: Duration,
}

impl NodeConfig {
    pub fn new(peer: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            session: SessionConfig::default(),
            rx_capacity: DEFAULT_QUEUE_CAPACITY,
            tx_capacity: DEFAULT_QUEUE_CAPACITY,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(120),
        }
    }

    pub fn network(&self) -> Network {
        self.session.network
    }

    /// `peer` with the network's default port appended when it has none.
    pub fn peer_with_port(&self) -> String {
        let has_port = match self.peer.rsplit_once(':') {
            // Bracketed IPv6 literal: "[::1]:8333" has a port, "[::1]" doesn't.
            Some((host, port)) if host.starts_with('[') => {
                host.ends_with(']') && port.parse::<u16>().is_ok()
            }
            // A bare IPv6 literal has several colons and no port.
            Some((host, port)) => !host.contains(':') && port.parse::<u16>().is_ok(),
            None => false,
        };

        if has_port {
            self.peer.clone()
        } else if self.peer.contains(':') && !self.peer.starts_with('[') {
            format!("[{}]:{}", self.peer, self.network().default_port())
        } else {
            format!("{}:{}", self.peer, self.network().default_port())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_magic_and_port() {
        assert_eq!(Network::Mainnet.magic(), 0xD9B4BEF9);
        assert_eq!(Network::Regtest.magic(), 0xDAB5BFFA);
        assert_eq!(Network::Testnet3.default_port(), 18333);
        assert_eq!(Network::Signet.default_port(), 38333);
    }

    #[test]
    fn network_parses_names() {
        assert_eq!("testnet".parse::<Network>().unwrap(), Network::Testnet3);
        assert_eq!("REGTEST".parse::<Network>().unwrap(), Network::Regtest);
        assert!("moonnet".parse::<Network>().is_err());
    }

    #[test]
    fn default_port_is_appended() {
        let mut config = NodeConfig::new("seed.bitcoin.sipa.be");
        assert_eq!(config.peer_with_port(), "seed.bitcoin.sipa.be:8333");

        config.peer = "127.0.0.1:18444".into();
        assert_eq!(config.peer_with_port(), "127.0.0.1:18444");

        config.session.network = Network::Regtest;
        config.peer = "::1".into();
        assert_eq!(config.peer_with_port(), "[::1]:18444");

        config.peer = "[::1]:1234".into();
        assert_eq!(config.peer_with_port(), "[::1]:1234");

        config.peer = "[::1]".into();
        assert_eq!(config.peer_with_port(), "[::1]:18444");
    }

    #[test]
    fn version_payload_is_fresh_each_time() {
        let config = SessionConfig {
            peer_addr: Some("10.0.0.7:8333".parse().unwrap()),
            ..SessionConfig::default()
        };

        let a = config.version_payload();
        let b = config.version_payload();

        assert_eq!(a.version, PROTOCOL_VERSION);
        assert_eq!(a.services, NODE_SERVICES);
        assert_eq!(a.addr_recv.port, 8333);
        assert_eq!(a.addr_recv.ip_addr(), "10.0.0.7".parse::<std::net::IpAddr>().unwrap());
        assert_eq!(a.user_agent, vec![0]);
        assert!(a.relay);
        // Random 64-bit nonces; a collision here is not a realistic outcome.
        assert_ne!(a.nonce, b.nonce);
    }
}
