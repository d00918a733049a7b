//! Bitcoin P2P wire protocol primitives.
//!
//! It implements:
//! - The 24-byte message header and its double-SHA256 checksum
//! - Handshake payloads (`version`, network addresses, `ping`/`pong`)
//! - Frame reading and writing over any `Read` / `Write`
//!
//! Protocol reference:
//! https://developer.bitcoin.org/reference/p2p_networking.html
pub mod codec;
pub mod constants;
pub mod header;
pub mod message;
pub mod payload;

pub use codec::{
    build_getaddr_message, build_message, build_pong_message, build_verack_message,
    build_version_message, read_frame, write_frame,
};
pub use header::{Header, checksum};
pub use message::{Command, Frame};
pub use payload::{Decode, Encode, NetAddr, Ping, Pong, TimedNetAddr, VersionPayload};
