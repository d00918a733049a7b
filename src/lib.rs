//! Minimal Bitcoin P2P peer.
//!
//! Performs the `version` / `verack` / `getaddr` handshake with one remote
//! peer and keeps the connection alive by answering pings.
//!
//! - [`fifo`]: bounded blocking queue between the socket threads and the session
//! - [`wire`]: message framing, checksum and handshake payloads
//! - [`session`]: the handshake state machine
//! - [`net`]: socket read/write loops and connection setup
pub mod config;
pub mod error;
pub mod fifo;
pub mod net;
pub mod session;
pub mod wire;

pub use config::{Network, NodeConfig, SessionConfig};
pub use error::{Error, Result};
pub use fifo::Fifo;
pub use session::{Session, SessionQueues, Stage};
