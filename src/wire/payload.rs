//! Handshake payload types and their byte layouts.
//!
//! Every type has a hand-written [`Encode`] / [`Decode`] pair that spells
//! out field order, width and byte order. All integers are little-endian
//! except the address port, which is big-endian.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use rand::Rng;
use std::io::{self, Cursor, Read};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::error::{Error, Result};
use crate::wire::constants::NET_ADDR_LEN;

/// Implemented by payload types with a fixed wire layout.
pub trait Encode {
    fn encode(&self, out: &mut Vec<u8>) -> Result<()>;

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = vec![];
        self.encode(&mut out)?;
        Ok(out)
    }
}

/// Implemented by types that can be decoded from a raw message payload.
pub trait Decode: Sized {
    fn decode(payload: &[u8]) -> Result<Self>;
}

fn truncated(field: &'static str) -> impl Fn(io::Error) -> Error {
    move |_| Error::Truncated(field)
}

/// Network address as carried inside a `version` message (no timestamp).
///
/// ```text
/// uint64    services      LE
/// char[16]  ip            IPv4-mapped IPv6
/// uint16    port          BE   <- the one big-endian field in the protocol
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetAddr {
    pub services: u64,
    pub ip: [u8; 16],
    pub port: u16,
}

impl NetAddr {
    pub fn new(services: u64, ip: IpAddr, port: u16) -> Self {
        let ip = match ip {
            IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
            IpAddr::V6(v6) => v6.octets(),
        };

        Self { services, ip, port }
    }

    pub fn from_socket_addr(services: u64, addr: SocketAddr) -> Self {
        Self::new(services, addr.ip(), addr.port())
    }

    /// The address as a std type, unwrapping IPv4-mapped addresses.
    pub fn ip_addr(&self) -> IpAddr {
        let v6 = Ipv6Addr::from(self.ip);
        match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        }
    }

    fn read(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let services = cursor
            .read_u64::<LittleEndian>()
            .map_err(truncated("net_addr: services"))?;

        let mut ip = [0u8; 16];
        cursor
            .read_exact(&mut ip)
            .map_err(truncated("net_addr: ip"))?;

        let port = cursor
            .read_u16::<BigEndian>()
            .map_err(truncated("net_addr: port"))?;

        Ok(Self { services, ip, port })
    }
}

impl Default for NetAddr {
    fn default() -> Self {
        Self::new(0, IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
    }
}

impl Encode for NetAddr {
    fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_u64::<LittleEndian>(self.services)?;
        out.extend_from_slice(&self.ip);
        out.write_u16::<BigEndian>(self.port)?;
        Ok(())
    }
}

impl Decode for NetAddr {
    fn decode(payload: &[u8]) -> Result<Self> {
        NetAddr::read(&mut Cursor::new(payload))
    }
}

/// Network address with the `uint32` timestamp prefix used by `addr`
/// messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedNetAddr {
    pub timestamp: u32,
    pub addr: NetAddr,
}

impl Encode for TimedNetAddr {
    fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_u32::<LittleEndian>(self.timestamp)?;
        self.addr.encode(out)
    }
}

impl Decode for TimedNetAddr {
    fn decode(payload: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(payload);
        let timestamp = cursor
            .read_u32::<LittleEndian>()
            .map_err(truncated("addr: timestamp"))?;
        let addr = NetAddr::read(&mut cursor)?;

        Ok(Self { timestamp, addr })
    }
}

/// `version` payload in its minimal form.
///
/// ```text
/// int32     version
/// uint64    services
/// int64     timestamp
/// net_addr  addr_recv
/// net_addr  addr_from
/// uint64    nonce
/// bytes     user_agent     written verbatim, no length prefix
/// int32     start_height
/// bool      relay
/// ```
///
/// `user_agent` holds the raw field bytes. A real peer expects a var_str
/// here, so the single byte `0x00` (an empty var_str) is the usual value.
///
/// Reference: https://developer.bitcoin.org/reference/p2p_networking.html#version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPayload {
    pub version: i32,
    pub services: u64,
    pub timestamp: i64,
    pub addr_recv: NetAddr,
    pub addr_from: NetAddr,
    pub nonce: u64,
    pub user_agent: Vec<u8>,
    pub start_height: i32,
    pub relay: bool,
}

/// Bytes following the user agent: start_height + relay.
const VERSION_TRAILER_LEN: usize = 4 + 1;

/// Bytes preceding the user agent.
const VERSION_PREFIX_LEN: usize = 4 + 8 + 8 + NET_ADDR_LEN * 2 + 8;

impl Encode for VersionPayload {
    fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_i32::<LittleEndian>(self.version)?;
        out.write_u64::<LittleEndian>(self.services)?;
        out.write_i64::<LittleEndian>(self.timestamp)?;
        self.addr_recv.encode(out)?;
        self.addr_from.encode(out)?;
        out.write_u64::<LittleEndian>(self.nonce)?;
        out.extend_from_slice(&self.user_agent);
        out.write_i32::<LittleEndian>(self.start_height)?;
        out.write_u8(u8::from(self.relay))?;
        Ok(())
    }
}

impl Decode for VersionPayload {
    /// Inverse of the minimal encoding: the user agent is every byte between
    /// the nonce and the trailing start_height + relay.
    fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < VERSION_PREFIX_LEN + VERSION_TRAILER_LEN {
            return Err(Error::Truncated("version"));
        }

        let mut c = Cursor::new(payload);
        let version = c.read_i32::<LittleEndian>().map_err(truncated("version: version"))?;
        let services = c.read_u64::<LittleEndian>().map_err(truncated("version: services"))?;
        let timestamp = c.read_i64::<LittleEndian>().map_err(truncated("version: timestamp"))?;
        let addr_recv = NetAddr::read(&mut c)?;
        let addr_from = NetAddr::read(&mut c)?;
        let nonce = c.read_u64::<LittleEndian>().map_err(truncated("version: nonce"))?;

        let ua_end = payload.len() - VERSION_TRAILER_LEN;
        let user_agent = payload[VERSION_PREFIX_LEN..ua_end].to_vec();
        c.set_position(ua_end as u64);

        let start_height = c.read_i32::<LittleEndian>().map_err(truncated("version: start_height"))?;
        let relay = c.read_u8().map_err(truncated("version: relay"))? != 0;

        Ok(Self {
            version,
            services,
            timestamp,
            addr_recv,
            addr_from,
            nonce,
            user_agent,
            start_height,
            relay,
        })
    }
}

impl VersionPayload {
    /// Human-readable user agent, skipping a leading var_str length byte if
    /// it matches the remaining length.
    pub fn user_agent_lossy(&self) -> String {
        let bytes = match self.user_agent.split_first() {
            Some((&len, rest)) if len as usize == rest.len() => rest,
            _ => &self.user_agent[..],
        };
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// `ping` payload. Pre-BIP31 peers send it empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    pub nonce: Option<u64>,
}

impl Decode for Ping {
    fn decode(payload: &[u8]) -> Result<Self> {
        if payload.is_empty() {
            return Ok(Self { nonce: None });
        }

        let nonce = Cursor::new(payload)
            .read_u64::<LittleEndian>()
            .map_err(truncated("ping: nonce"))?;

        Ok(Self { nonce: Some(nonce) })
    }
}

/// `pong` payload: the nonce of the ping being answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pong {
    pub nonce: u64,
}

impl Pong {
    /// Answers `ping`, echoing its nonce. Nonce-less pings get a fresh one.
    pub fn reply_to(ping: &Ping) -> Self {
        Self {
            nonce: ping.nonce.unwrap_or_else(|| rand::thread_rng().r#gen()),
        }
    }
}

impl Encode for Pong {
    fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_u64::<LittleEndian>(self.nonce)?;
        Ok(())
    }
}

impl Decode for Pong {
    fn decode(payload: &[u8]) -> Result<Self> {
        let nonce = Cursor::new(payload)
            .read_u64::<LittleEndian>()
            .map_err(truncated("pong: nonce"))?;

        Ok(Self { nonce })
    }
}
