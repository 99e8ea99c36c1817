//! # ARC wire
//!
//! Bitcoin-family framed message read/write: the message set ARC needs to
//! announce transactions and observe blocks (VERSION, VERACK, PING, PONG,
//! INV, GETDATA, TX, BLOCK, REJECT), a [`tokio_util::codec`] codec framing
//! them with network magic and a double-SHA-256 checksum, and block parsing
//! with per-transaction id computation.
//!
//! The codec does not drive connections itself; the `arc-p2p` crate owns
//! sockets and reconnect behavior.

mod block;
mod codec;
mod message;
mod network;
pub mod varint;

pub use block::{extract_coinbase_height, BlockHeader, BlockMessage};
pub use codec::MessageCodec;
pub use message::{Command, InvKind, InvVect, Message, NetAddress, Reject, RejectCode, Version};
pub use network::Network;

/// The protocol version we advertise in VERSION messages.
pub const PROTOCOL_VERSION: u32 = 70013;

/// The user agent we advertise in VERSION messages.
pub const USER_AGENT: &str = "/arc:0.1.0/";

/// The NODE_NETWORK service flag.
pub const SERVICE_NODE_NETWORK: u64 = 1;

/// Errors working with wire messages.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The payload ended before the field being read.
    #[error("message payload truncated")]
    Truncated,
    /// The frame header did not start with our network's magic bytes.
    #[error("invalid magic bytes: {0:#010x}")]
    InvalidMagic(u32),
    /// The payload hash did not match the frame checksum.
    #[error("invalid checksum for {0} message")]
    InvalidChecksum(String),
    /// The frame advertised a payload above the configured limit.
    #[error("message of {0} bytes exceeds the size limit")]
    MessageTooLarge(u64),
    /// A known command with a payload that does not parse.
    #[error("malformed {0} payload")]
    Malformed(&'static str),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// Whether the stream can keep being read after this error.
    ///
    /// Framing-level failures leave the byte stream unsynchronized, payload
    /// failures do not: the whole frame has already been consumed.
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Malformed(_) | Self::InvalidChecksum(_))
    }
}
