//! The message set.

use std::{
    fmt,
    net::{IpAddr, SocketAddr},
};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use arc_types::ChainHash;

use crate::{varint, WireError, PROTOCOL_VERSION, SERVICE_NODE_NETWORK, USER_AGENT};

/// A wire command, as carried in the 12-byte frame header field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Version,
    Verack,
    Ping,
    Pong,
    Inv,
    GetData,
    Tx,
    Block,
    Reject,
    Unknown(String),
}

impl Command {
    /// Parses the zero-padded header field.
    pub fn from_header_bytes(bytes: &[u8; 12]) -> Self {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(12);
        let name = String::from_utf8_lossy(&bytes[..end]);
        match name.as_ref() {
            "version" => Self::Version,
            "verack" => Self::Verack,
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "inv" => Self::Inv,
            "getdata" => Self::GetData,
            "tx" => Self::Tx,
            "block" => Self::Block,
            "reject" => Self::Reject,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The zero-padded header field for this command.
    ///
    /// Names longer than 12 bytes are truncated to fit the field.
    pub fn to_header_bytes(&self) -> [u8; 12] {
        let mut bytes = [0u8; 12];
        let name = self.as_str().as_bytes();
        let len = name.len().min(12);
        bytes[..len].copy_from_slice(&name[..len]);
        bytes
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Version => "version",
            Self::Verack => "verack",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Inv => "inv",
            Self::GetData => "getdata",
            Self::Tx => "tx",
            Self::Block => "block",
            Self::Reject => "reject",
            Self::Unknown(name) => name,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The type tag of an inventory vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvKind {
    Tx,
    Block,
    Unknown(u32),
}

impl InvKind {
    const fn to_u32(self) -> u32 {
        match self {
            Self::Tx => 1,
            Self::Block => 2,
            Self::Unknown(n) => n,
        }
    }

    const fn from_u32(n: u32) -> Self {
        match n {
            1 => Self::Tx,
            2 => Self::Block,
            other => Self::Unknown(other),
        }
    }
}

/// An inventory vector: a typed hash advertising or requesting an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvVect {
    pub kind: InvKind,
    pub hash: ChainHash,
}

impl InvVect {
    pub const fn tx(hash: ChainHash) -> Self {
        Self {
            kind: InvKind::Tx,
            hash,
        }
    }

    pub const fn block(hash: ChainHash) -> Self {
        Self {
            kind: InvKind::Block,
            hash,
        }
    }
}

/// A network address as carried inside VERSION messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetAddress {
    pub services: u64,
    /// IPv6, or an IPv4-mapped IPv6 address.
    pub ip: [u8; 16],
    pub port: u16,
}

impl NetAddress {
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        let ip = match addr.ip() {
            IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
            IpAddr::V6(v6) => v6.octets(),
        };
        Self {
            services: SERVICE_NODE_NETWORK,
            ip,
            port: addr.port(),
        }
    }

    /// The unroutable "we don't accept inbound" address.
    pub const fn unspecified() -> Self {
        Self {
            services: SERVICE_NODE_NETWORK,
            ip: [0; 16],
            port: 0,
        }
    }

    fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u64_le(self.services);
        buf.put_slice(&self.ip);
        buf.put_u16(self.port);
    }

    fn read<B: Buf>(buf: &mut B) -> Result<Self, WireError> {
        if buf.remaining() < 26 {
            return Err(WireError::Truncated);
        }
        let services = buf.get_u64_le();
        let mut ip = [0u8; 16];
        buf.copy_to_slice(&mut ip);
        let port = buf.get_u16();
        Ok(Self { services, ip, port })
    }
}

/// A VERSION handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub version: u32,
    pub services: u64,
    pub timestamp: i64,
    pub receiver: NetAddress,
    pub sender: NetAddress,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: i32,
    pub relay: bool,
}

impl Version {
    /// The VERSION message we send on connect.
    pub fn outbound(peer: SocketAddr, nonce: u64, timestamp: i64) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            services: SERVICE_NODE_NETWORK,
            timestamp,
            receiver: NetAddress::from_socket_addr(peer),
            sender: NetAddress::unspecified(),
            nonce,
            user_agent: USER_AGENT.to_string(),
            start_height: 0,
            relay: true,
        }
    }
}

/// Reject control codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectCode {
    Malformed,
    Invalid,
    Obsolete,
    Duplicate,
    Nonstandard,
    Dust,
    InsufficientFee,
    Checkpoint,
    Unknown(u8),
}

impl RejectCode {
    const fn to_u8(self) -> u8 {
        match self {
            Self::Malformed => 0x01,
            Self::Invalid => 0x10,
            Self::Obsolete => 0x11,
            Self::Duplicate => 0x12,
            Self::Nonstandard => 0x40,
            Self::Dust => 0x41,
            Self::InsufficientFee => 0x42,
            Self::Checkpoint => 0x43,
            Self::Unknown(n) => n,
        }
    }

    const fn from_u8(n: u8) -> Self {
        match n {
            0x01 => Self::Malformed,
            0x10 => Self::Invalid,
            0x11 => Self::Obsolete,
            0x12 => Self::Duplicate,
            0x40 => Self::Nonstandard,
            0x41 => Self::Dust,
            0x42 => Self::InsufficientFee,
            0x43 => Self::Checkpoint,
            other => Self::Unknown(other),
        }
    }
}

/// A REJECT message: the peer refused an object we relayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reject {
    /// The command being rejected, e.g. `tx`.
    pub message: String,
    pub code: RejectCode,
    pub reason: String,
    /// The object hash, present for `tx` and `block` rejects.
    pub hash: Option<ChainHash>,
}

/// One wire message.
///
/// BLOCK payloads stay raw here; [`crate::BlockMessage::parse`] turns them
/// into header + transaction ids at the point a handler wants them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Version(Version),
    Verack,
    Ping(u64),
    Pong(u64),
    Inv(Vec<InvVect>),
    GetData(Vec<InvVect>),
    Tx(Bytes),
    Block(Bytes),
    Reject(Reject),
    Unknown { command: String, payload: Bytes },
}

impl Message {
    pub fn command(&self) -> Command {
        match self {
            Self::Version(_) => Command::Version,
            Self::Verack => Command::Verack,
            Self::Ping(_) => Command::Ping,
            Self::Pong(_) => Command::Pong,
            Self::Inv(_) => Command::Inv,
            Self::GetData(_) => Command::GetData,
            Self::Tx(_) => Command::Tx,
            Self::Block(_) => Command::Block,
            Self::Reject(_) => Command::Reject,
            Self::Unknown { command, .. } => Command::Unknown(command.clone()),
        }
    }

    /// Serializes the message body (everything after the frame header).
    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Self::Version(v) => {
                buf.put_u32_le(v.version);
                buf.put_u64_le(v.services);
                buf.put_i64_le(v.timestamp);
                v.receiver.write(&mut buf);
                v.sender.write(&mut buf);
                buf.put_u64_le(v.nonce);
                write_var_string(&mut buf, &v.user_agent);
                buf.put_i32_le(v.start_height);
                buf.put_u8(u8::from(v.relay));
            }
            Self::Verack => {}
            Self::Ping(nonce) | Self::Pong(nonce) => buf.put_u64_le(*nonce),
            Self::Inv(list) | Self::GetData(list) => {
                varint::write_varint(&mut buf, list.len() as u64);
                for inv in list {
                    buf.put_u32_le(inv.kind.to_u32());
                    buf.put_slice(inv.hash.as_bytes());
                }
            }
            Self::Tx(raw) | Self::Block(raw) => buf.put_slice(raw),
            Self::Reject(r) => {
                write_var_string(&mut buf, &r.message);
                buf.put_u8(r.code.to_u8());
                write_var_string(&mut buf, &r.reason);
                if let Some(hash) = &r.hash {
                    buf.put_slice(hash.as_bytes());
                }
            }
            Self::Unknown { payload, .. } => buf.put_slice(payload),
        }
        buf.freeze()
    }

    /// Parses a message body for a known command.
    pub fn from_payload(command: Command, mut payload: Bytes) -> Result<Self, WireError> {
        match command {
            Command::Version => {
                let buf = &mut payload;
                if buf.remaining() < 4 + 8 + 8 {
                    return Err(WireError::Malformed("version"));
                }
                let version = buf.get_u32_le();
                let services = buf.get_u64_le();
                let timestamp = buf.get_i64_le();
                let receiver = NetAddress::read(buf).map_err(|_| WireError::Malformed("version"))?;
                let sender = NetAddress::read(buf).map_err(|_| WireError::Malformed("version"))?;
                if buf.remaining() < 8 {
                    return Err(WireError::Malformed("version"));
                }
                let nonce = buf.get_u64_le();
                let user_agent =
                    read_var_string(buf).map_err(|_| WireError::Malformed("version"))?;
                if buf.remaining() < 4 {
                    return Err(WireError::Malformed("version"));
                }
                let start_height = buf.get_i32_le();
                let relay = if buf.has_remaining() {
                    buf.get_u8() != 0
                } else {
                    true
                };
                Ok(Self::Version(Version {
                    version,
                    services,
                    timestamp,
                    receiver,
                    sender,
                    nonce,
                    user_agent,
                    start_height,
                    relay,
                }))
            }
            Command::Verack => Ok(Self::Verack),
            Command::Ping | Command::Pong => {
                if payload.remaining() < 8 {
                    return Err(WireError::Malformed("ping"));
                }
                let nonce = payload.get_u64_le();
                Ok(match command {
                    Command::Ping => Self::Ping(nonce),
                    _ => Self::Pong(nonce),
                })
            }
            Command::Inv | Command::GetData => {
                let buf = &mut payload;
                let count = varint::read_varint(buf).map_err(|_| WireError::Malformed("inv"))?;
                if count > MAX_INV_ENTRIES {
                    return Err(WireError::Malformed("inv"));
                }
                let mut list = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    if buf.remaining() < 4 + 32 {
                        return Err(WireError::Malformed("inv"));
                    }
                    let kind = InvKind::from_u32(buf.get_u32_le());
                    let mut hash = [0u8; 32];
                    buf.copy_to_slice(&mut hash);
                    list.push(InvVect {
                        kind,
                        hash: hash.into(),
                    });
                }
                Ok(match command {
                    Command::Inv => Self::Inv(list),
                    _ => Self::GetData(list),
                })
            }
            Command::Tx => Ok(Self::Tx(payload)),
            Command::Block => Ok(Self::Block(payload)),
            Command::Reject => {
                let buf = &mut payload;
                let message = read_var_string(buf).map_err(|_| WireError::Malformed("reject"))?;
                if buf.remaining() < 1 {
                    return Err(WireError::Malformed("reject"));
                }
                let code = RejectCode::from_u8(buf.get_u8());
                let reason = read_var_string(buf).map_err(|_| WireError::Malformed("reject"))?;
                let hash = if buf.remaining() >= 32 {
                    let mut bytes = [0u8; 32];
                    buf.copy_to_slice(&mut bytes);
                    Some(ChainHash::from(bytes))
                } else {
                    None
                };
                Ok(Self::Reject(Reject {
                    message,
                    code,
                    reason,
                    hash,
                }))
            }
            Command::Unknown(command) => Ok(Self::Unknown { command, payload }),
        }
    }
}

/// Upper bound on inventory vectors in one message, matching the reference
/// node limit.
const MAX_INV_ENTRIES: u64 = 50_000;

fn write_var_string<B: BufMut>(buf: &mut B, s: &str) {
    varint::write_varint(buf, s.len() as u64);
    buf.put_slice(s.as_bytes());
}

fn read_var_string<B: Buf>(buf: &mut B) -> Result<String, WireError> {
    let len = varint::read_varint(buf)?;
    if len > buf.remaining() as u64 {
        return Err(WireError::Truncated);
    }
    let bytes = buf.copy_to_bytes(len as usize);
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
