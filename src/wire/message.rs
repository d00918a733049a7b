use std::fmt::{self, Display, Formatter};

use crate::error::{Error, Result};
use crate::wire::constants::{COMMAND_LEN, HEADER_LEN};
use crate::wire::header::Header;

/// Commands this node reacts to or is likely to see during a handshake.
///
/// Anything else decodes to [`Command::Unknown`]; the session ignores it.
///
/// Only `version`, `verack` and `ping` change what the session does. The
/// other variants exist so logs name the traffic a peer sends after the
/// handshake instead of reporting it as unknown.
///
/// See:
/// https://developer.bitcoin.org/reference/p2p_networking.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // Handshake
    Version,
    Verack,
    // Keepalive
    Ping,
    Pong,
    // Addresses
    GetAddr,
    Addr,
    AddrV2,
    SendAddrV2,
    // Announced right after the handshake by modern peers
    SendHeaders,
    SendCmpct,
    FeeFilter,
    WtxidRelay,
    Inv,

    Unknown,
}

const NAMES: &[(Command, &str)] = &[
    (Command::Version, "version"),
    (Command::Verack, "verack"),
    (Command::Ping, "ping"),
    (Command::Pong, "pong"),
    (Command::GetAddr, "getaddr"),
    (Command::Addr, "addr"),
    (Command::AddrV2, "addrv2"),
    (Command::SendAddrV2, "sendaddrv2"),
    (Command::SendHeaders, "sendheaders"),
    (Command::SendCmpct, "sendcmpct"),
    (Command::FeeFilter, "feefilter"),
    (Command::WtxidRelay, "wtxidrelay"),
    (Command::Inv, "inv"),
];

impl Command {
    /// Wire name of the command, `""` for [`Command::Unknown`].
    pub fn name(self) -> &'static str {
        NAMES
            .iter()
            .find(|(cmd, _)| *cmd == self)
            .map_or("", |(_, name)| *name)
    }

    /// Looks up a command by its wire name.
    pub fn from_name(name: &str) -> Self {
        NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map_or(Command::Unknown, |(cmd, _)| *cmd)
    }
}

impl From<&[u8; COMMAND_LEN]> for Command {
    fn from(bytes: &[u8; COMMAND_LEN]) -> Self {
        let name = std::str::from_utf8(bytes)
            .unwrap_or("")
            .trim_end_matches(char::from(0));

        Command::from_name(name)
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Command::Unknown => f.write_str("<unknown>"),
            cmd => f.write_str(cmd.name()),
        }
    }
}

/// One complete protocol message: the 24-byte header immediately followed by
/// the payload.
///
/// Frames are what the queues carry. Whoever pops a frame owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Vec<u8>);

impl Frame {
    /// Assembles a frame from an already-built header and its payload.
    pub fn new(header: &Header, payload: &[u8]) -> Result<Self> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        header.write_to(&mut bytes)?;
        bytes.extend_from_slice(payload);
        Ok(Self(bytes))
    }

    /// Decodes the header bytes.
    ///
    /// # Errors
    ///
    /// [`Error::Truncated`] if the frame is shorter than a header.
    pub fn header(&self) -> Result<Header> {
        let bytes: &[u8; HEADER_LEN] = self
            .0
            .get(..HEADER_LEN)
            .and_then(|h| h.try_into().ok())
            .ok_or(Error::Truncated("frame header"))?;

        Ok(Header::decode(bytes))
    }

    /// Everything after the header.
    pub fn payload(&self) -> &[u8] {
        self.0.get(HEADER_LEN..).unwrap_or(&[])
    }

    pub fn command(&self) -> Result<Command> {
        Ok(Command::from(&self.header()?.command))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
