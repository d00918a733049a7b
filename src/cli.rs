//! Command-line argument parsing.

use std::time::Duration;

use clap::Parser;

use btc_peer::config::{DEFAULT_QUEUE_CAPACITY, Network, NodeConfig};
use btc_peer::wire::constants::NODE_SERVICES;

#[derive(Parser, Debug, Clone)]
#[command(name = "btc-peer")]
#[command(about = "Handshake with a Bitcoin node and keep the connection alive")]
#[command(version)]
pub struct Cli {
    /// Peer to connect to, host[:port]. The port defaults to the network's.
    #[arg(long)]
    pub node: String,

    /// Network: mainnet, testnet, regtest or signet.
    #[arg(long, default_value = "mainnet")]
    pub network: Network,

    /// Capacity of the inbound frame queue (0 = unbounded).
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub rx_capacity: usize,

    /// Capacity of the outbound frame queue (0 = unbounded).
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub tx_capacity: usize,

    /// User agent advertised in our version message.
    #[arg(long, default_value = "", value_parser = parse_user_agent)]
    pub user_agent: String,

    /// Best block height advertised in our version message.
    #[arg(long, default_value_t = 0)]
    pub start_height: i32,

    /// Ask the peer not to relay transactions to us.
    #[arg(long)]
    pub no_relay: bool,

    /// Service flags advertised in our version message.
    #[arg(long, default_value_t = NODE_SERVICES)]
    pub services: u64,

    /// Seconds to wait for the TCP connection.
    #[arg(long, default_value_t = 30)]
    pub connect_timeout: u64,

    /// Seconds of silence after which the peer is dropped.
    #[arg(long, default_value_t = 120)]
    pub idle_timeout: u64,

    /// Log level (trace, debug, info, warn, error). RUST_LOG wins if set.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn node_config(&self) -> NodeConfig {
        let mut config = NodeConfig::new(self.node.clone());

        config.rx_capacity = self.rx_capacity;
        config.tx_capacity = self.tx_capacity;
        config.connect_timeout = Duration::from_secs(self.connect_timeout);
        config.idle_timeout = Duration::from_secs(self.idle_timeout);

        config.session.network = self.network;
        config.session.services = self.services;
        config.session.user_agent = var_str(self.user_agent.as_bytes());
        config.session.start_height = self.start_height;
        config.session.relay = !self.no_relay;

        config
    }
}

/// Longest user agent whose length still fits a one-byte prefix.
const MAX_USER_AGENT_LEN: usize = 0xFC;

fn parse_user_agent(s: &str) -> Result<String, String> {
    if s.len() > MAX_USER_AGENT_LEN {
        return Err(format!(
            "user agent is {} bytes, at most {MAX_USER_AGENT_LEN} allowed",
            s.len()
        ));
    }
    Ok(s.to_string())
}

/// Length-prefixed string as real peers expect it. `parse_user_agent`
/// keeps the prefix to a single byte.
fn var_str(s: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() + 1);
    out.push(s.len() as u8);
    out.extend_from_slice(s);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["btc-peer", "--node", "127.0.0.1"]);
        let config = cli.node_config();

        assert_eq!(config.network(), Network::Mainnet);
        assert_eq!(config.rx_capacity, 32);
        assert_eq!(config.tx_capacity, 32);
        assert_eq!(config.session.user_agent, vec![0]);
        assert!(config.session.relay);
        assert_eq!(config.peer_with_port(), "127.0.0.1:8333");
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn overrides() {
        let cli = Cli::parse_from([
            "btc-peer",
            "--node",
            "localhost",
            "--network",
            "regtest",
            "--user-agent",
            "/btc-peer:0.1.0/",
            "--no-relay",
            "--rx-capacity",
            "0",
        ]);
        let config = cli.node_config();

        assert_eq!(config.peer_with_port(), "localhost:18444");
        assert_eq!(config.rx_capacity, 0);
        assert!(!config.session.relay);
        assert_eq!(config.session.user_agent[0], 16);
        assert_eq!(&config.session.user_agent[1..], b"/btc-peer:0.1.0/");
    }

    #[test]
    fn overlong_user_agent_is_rejected() {
        let longest = "u".repeat(MAX_USER_AGENT_LEN);
        let cli = Cli::parse_from(["btc-peer", "--node", "x", "--user-agent", longest.as_str()]);
        let config = cli.node_config();
        assert_eq!(config.session.user_agent[0], 0xFC);
        assert_eq!(config.session.user_agent.len(), MAX_USER_AGENT_LEN + 1);

        let too_long = "u".repeat(MAX_USER_AGENT_LEN + 1);
        let err = Cli::try_parse_from(["btc-peer", "--node", "x", "--user-agent", too_long.as_str()])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
