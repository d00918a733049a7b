use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::wire::constants::{COMMAND_LEN, HEADER_LEN, MAX_PAYLOAD_SIZE};

/// Computes the message checksum of `payload`.
///
/// Defined as the first 4 bytes of `SHA256(SHA256(payload))`, read as a
/// little-endian `u32` so it can be compared with the decoded header field.
pub fn checksum(payload: &[u8]) -> u32 {
    let hash = Sha256::digest(Sha256::digest(payload));
    LittleEndian::read_u32(&hash[..4])
}

/// The fixed 24-byte header in front of every Bitcoin P2P message.
///
/// ```text
/// +------------+--------------+---------------+----------------+
/// | magic (4)  | command (12) | length (4 LE) | checksum (4 LE)|
/// +------------+--------------+---------------+----------------+
/// ```
///
/// Reference: https://developer.bitcoin.org/reference/p2p_networking.html#message-headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    pub command: [u8; COMMAND_LEN],
    pub length: u32,
    pub checksum: u32,
}

impl Header {
    /// Builds the header for `payload` sent as `command` on the `magic` network.
    ///
    /// # Errors
    ///
    /// [`Error::CommandTooLong`] if `command` doesn't fit in 12 bytes,
    /// [`Error::PayloadTooLarge`] if the payload exceeds [`MAX_PAYLOAD_SIZE`].
    pub fn new(magic: u32, command: &str, payload: &[u8]) -> Result<Self> {
        let name = command.as_bytes();
        if name.len() > COMMAND_LEN {
            return Err(Error::CommandTooLong { len: name.len() });
        }
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let mut padded = [0u8; COMMAND_LEN];
        padded[..name.len()].copy_from_slice(name);

        Ok(Self {
            magic,
            command: padded,
            length: payload.len() as u32,
            checksum: checksum(payload),
        })
    }

    /// Parses the fixed header layout. Every integer field is little-endian.
    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Self {
        let mut command = [0u8; COMMAND_LEN];
        command.copy_from_slice(&bytes[4..16]);

        Self {
            magic: LittleEndian::read_u32(&bytes[0..4]),
            command,
            length: LittleEndian::read_u32(&bytes[16..20]),
            checksum: LittleEndian::read_u32(&bytes[20..24]),
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        LittleEndian::write_u32(&mut out[0..4], self.magic);
        out[4..16].copy_from_slice(&self.command);
        LittleEndian::write_u32(&mut out[16..20], self.length);
        LittleEndian::write_u32(&mut out[20..24], self.checksum);
        out
    }

    /// Appends the encoded header to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_u32::<LittleEndian>(self.magic)?;
        out.extend_from_slice(&self.command);
        out.write_u32::<LittleEndian>(self.length)?;
        out.write_u32::<LittleEndian>(self.checksum)?;
        Ok(())
    }

    /// True iff `payload` has the announced length and checksum.
    ///
    /// Frames failing this check must never reach the inbound queue.
    pub fn validate(&self, payload: &[u8]) -> bool {
        payload.len() == self.length as usize && checksum(payload) == self.checksum
    }

    /// Command name with the NUL padding stripped.
    ///
    /// Non-UTF-8 names come back as an empty string.
    pub fn command_name(&self) -> &str {
        std::str::from_utf8(&self.command)
            .unwrap_or("")
            .trim_end_matches(char::from(0))
    }
}
