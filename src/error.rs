//! Crate error type.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the peer connection. Fatal to the connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Command name does not fit the 12-byte header field.
    #[error("command name too long: {len} bytes (max: 12)")]
    CommandTooLong { len: usize },

    /// Payload exceeds the protocol's maximum message size.
    #[error("payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Not enough bytes to decode the named field.
    #[error("truncated payload: {0}")]
    Truncated(&'static str),

    /// Frame carries another network's magic, the stream can't be trusted.
    #[error("bad network magic: expected 0x{expected:08X}, got 0x{actual:08X}")]
    BadMagic { expected: u32, actual: u32 },

    /// A queue was shut down while we were handing it a frame.
    #[error("queue closed")]
    QueueClosed,

    #[error("could not resolve peer address: {0}")]
    Resolve(String),
}

pub type Result<T> = std::result::Result<T, Error>;
