/// Current Bitcoin P2P protocol version advertised in our `version` message.
///
/// 70015 is the last version before BIP 339 (`wtxidrelay`), so peers don't
/// expect any post-handshake feature negotiation from us.
///
/// It is serialized on the wire as a signed 32-bit little-endian integer.
///
/// You can find a list of notable versions here: https://developer.bitcoin.org/reference/p2p_networking.html#protocol-versions
pub const PROTOCOL_VERSION: i32 = 70015;

/// Service flags we advertise: NODE_NETWORK | NODE_BLOOM | NODE_WITNESS.
pub const NODE_SERVICES: u64 = 0x0d;

/// Size of the fixed message header.
pub const HEADER_LEN: usize = 24;

/// Width of the NUL-padded command field.
pub const COMMAND_LEN: usize = 12;

/// Size of a network address without the timestamp prefix.
pub const NET_ADDR_LEN: usize = 26;

/// Largest payload Bitcoin Core will accept (`MAX_SIZE`, 32 MiB).
///
/// A header announcing more than this is rejected before allocating.
pub const MAX_PAYLOAD_SIZE: usize = 32 * 1024 * 1024;

/// Network magic values used in the Bitcoin P2P message header.
///
/// The first 4 bytes of every message identify the network and act as a
/// message boundary marker in the TCP stream.
///
/// See `GetNetworkForMagic` in Bitcoin Core:
/// https://github.com/bitcoin/bitcoin/blob/master/src/kernel/chainparams.cpp#L703-L723
pub const MAINNET_MAGIC: u32 = 0xD9B4BEF9;
pub const TESTNET3_MAGIC: u32 = 0x0709110B;
pub const REGTEST_MAGIC: u32 = 0xDAB5BFFA;
pub const SIGNET_MAGIC: u32 = 0x40CF030A;

pub const MAINNET_PORT: u16 = 8333;
pub const TESTNET3_PORT: u16 = 18333;
pub const REGTEST_PORT: u16 = 18444;
pub const SIGNET_PORT: u16 = 38333;
