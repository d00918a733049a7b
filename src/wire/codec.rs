use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::wire::constants::{HEADER_LEN, MAX_PAYLOAD_SIZE};
use crate::wire::header::Header;
use crate::wire::message::{Command, Frame};
use crate::wire::payload::{Encode, Pong, VersionPayload};

/// Combines a header for `payload` with the payload itself.
///
/// The checksum is the first 4 bytes of `SHA256(SHA256(payload))`.
///
/// # Errors
///
/// Fails instead of producing a short or empty frame when the command name
/// is longer than 12 bytes or the payload is oversize. A malformed frame
/// would desynchronise the peer's framing for every later message.
///
/// # Example
///
/// ```
/// use btc_peer::wire::{self, constants::MAINNET_MAGIC};
///
/// let frame = wire::build_message(MAINNET_MAGIC, "verack", &[]).unwrap();
/// assert_eq!(frame.len(), 24);
///
/// assert!(wire::build_message(MAINNET_MAGIC, "waytoolongcommand", &[]).is_err());
/// ```
pub fn build_message(magic: u32, command: &str, payload: &[u8]) -> Result<Frame> {
    let header = Header::new(magic, command, payload)?;
    Frame::new(&header, payload)
}

pub fn build_version_message(magic: u32, version: &VersionPayload) -> Result<Frame> {
    build_message(magic, Command::Version.name(), &version.to_bytes()?)
}

pub fn build_verack_message(magic: u32) -> Result<Frame> {
    build_message(magic, Command::Verack.name(), &[])
}

pub fn build_getaddr_message(magic: u32) -> Result<Frame> {
    build_message(magic, Command::GetAddr.name(), &[])
}

pub fn build_pong_message(magic: u32, pong: &Pong) -> Result<Frame> {
    build_message(magic, Command::Pong.name(), &pong.to_bytes()?)
}

/// Reads one header and exactly `header.length` payload bytes from `reader`.
///
/// Nothing is validated here except the announced length, which is checked
/// against [`MAX_PAYLOAD_SIZE`] before the payload buffer is allocated.
/// Callers decide what to do with a bad magic or checksum.
///
/// # Errors
///
/// Any read failure, including a short read, is returned as
/// [`Error::Io`] and is fatal to the connection.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use btc_peer::wire::{self, constants::MAINNET_MAGIC};
///
/// let frame = wire::build_message(MAINNET_MAGIC, "ping", &7u64.to_le_bytes()).unwrap();
/// let mut cursor = Cursor::new(frame.into_bytes());
///
/// let (header, payload) = wire::read_frame(&mut cursor).unwrap();
/// assert_eq!(header.command_name(), "ping");
/// assert!(header.validate(&payload));
/// ```
pub fn read_frame<R: Read>(reader: &mut R) -> Result<(Header, Vec<u8>)> {
    let mut raw = [0u8; HEADER_LEN];
    reader.read_exact(&mut raw)?;

    let header = Header::decode(&raw);

    let length = header.length as usize;
    if length > MAX_PAYLOAD_SIZE {
        return Err(Error::PayloadTooLarge {
            size: length,
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload)?;

    Ok((header, payload))
}

/// Writes `frame` verbatim and flushes.
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<()> {
    writer.write_all(frame.as_bytes())?;
    writer.flush()?;
    Ok(())
}
