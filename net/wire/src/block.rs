//! Block parsing.
//!
//! ARC never validates blocks; it only needs the header, the id of every
//! transaction, and the height carried by the coinbase input script. The
//! parser therefore walks transaction boundaries without interpreting
//! scripts or amounts.

use bytes::{Buf, BufMut, BytesMut};

use arc_types::ChainHash;

use crate::{varint, WireError};

/// An 80-byte block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_hash: ChainHash,
    pub merkle_root: ChainHash,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Reads a header off the front of `buf`.
    pub fn read(buf: &mut &[u8]) -> Result<Self, WireError> {
        if buf.remaining() < 80 {
            return Err(WireError::Truncated);
        }
        let version = buf.get_u32_le();
        let mut prev_hash = [0u8; 32];
        buf.copy_to_slice(&mut prev_hash);
        let mut merkle_root = [0u8; 32];
        buf.copy_to_slice(&mut merkle_root);
        let timestamp = buf.get_u32_le();
        let bits = buf.get_u32_le();
        let nonce = buf.get_u32_le();
        Ok(Self {
            version,
            prev_hash: prev_hash.into(),
            merkle_root: merkle_root.into(),
            timestamp,
            bits,
            nonce,
        })
    }

    /// Serializes the 80-byte wire form.
    pub fn to_bytes(&self) -> [u8; 80] {
        let mut buf = BytesMut::with_capacity(80);
        buf.put_u32_le(self.version);
        buf.put_slice(self.prev_hash.as_bytes());
        buf.put_slice(self.merkle_root.as_bytes());
        buf.put_u32_le(self.timestamp);
        buf.put_u32_le(self.bits);
        buf.put_u32_le(self.nonce);
        buf[..].try_into().expect("header is exactly 80 bytes")
    }

    /// The block hash: double-SHA-256 of the serialized header.
    pub fn hash(&self) -> ChainHash {
        ChainHash::double_sha256(&self.to_bytes())
    }
}

/// A fully walked block: header plus every transaction's id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMessage {
    pub header: BlockHeader,
    /// The header hash.
    pub hash: ChainHash,
    /// Height taken from the coinbase input script.
    pub height: u64,
    /// Transaction ids in canonical block order; index 0 is the coinbase.
    pub transaction_hashes: Vec<ChainHash>,
    /// Serialized block size in bytes.
    pub size: u64,
}

impl BlockMessage {
    /// Parses a raw BLOCK payload.
    pub fn parse(raw: &[u8]) -> Result<Self, WireError> {
        let mut rest = raw;
        let header = BlockHeader::read(&mut rest)?;
        let tx_count = varint::read_varint(&mut rest)?;
        if tx_count == 0 {
            return Err(WireError::Malformed("block"));
        }

        let mut offset = raw.len() - rest.len();
        let mut transaction_hashes = Vec::new();
        let mut height = 0;

        for index in 0..tx_count {
            let end = tx_span(raw, offset)?;
            let tx_bytes = &raw[offset..end];
            transaction_hashes.push(ChainHash::double_sha256(tx_bytes));
            if index == 0 {
                height = extract_coinbase_height(coinbase_script(tx_bytes)?);
            }
            offset = end;
        }

        if offset != raw.len() {
            return Err(WireError::Malformed("block"));
        }

        Ok(Self {
            hash: header.hash(),
            header,
            height,
            transaction_hashes,
            size: raw.len() as u64,
        })
    }
}

/// Extracts the block height a coinbase input script carries.
///
/// Two encodings exist in the wild: an OP_1..OP_16 opcode for tiny heights,
/// and a length-prefixed little-endian push for everything else. Returns 0
/// when the script doesn't carry a readable height.
pub fn extract_coinbase_height(script: &[u8]) -> u64 {
    let Some(&first) = script.first() else {
        return 0;
    };
    if (0x51..=0x60).contains(&first) {
        return u64::from(first - 0x50);
    }

    let len = usize::from(first);
    if len == 0 || len > 8 || script.len() < len + 1 {
        return 0;
    }
    let mut bytes = [0u8; 8];
    bytes[..len].copy_from_slice(&script[1..=len]);
    u64::from_le_bytes(bytes)
}

/// Returns the byte offset just past the transaction starting at `start`.
fn tx_span(raw: &[u8], start: usize) -> Result<usize, WireError> {
    let mut rest = raw.get(start..).ok_or(WireError::Truncated)?;
    let len_at_start = rest.len();

    skip(&mut rest, 4)?; // version
    let input_count = varint::read_varint(&mut rest)?;
    for _ in 0..input_count {
        skip(&mut rest, 32 + 4)?; // previous outpoint
        let script_len = varint::read_varint(&mut rest)?;
        skip_u64(&mut rest, script_len)?;
        skip(&mut rest, 4)?; // sequence
    }
    let output_count = varint::read_varint(&mut rest)?;
    for _ in 0..output_count {
        skip(&mut rest, 8)?; // value
        let script_len = varint::read_varint(&mut rest)?;
        skip_u64(&mut rest, script_len)?;
    }
    skip(&mut rest, 4)?; // lock time

    Ok(start + (len_at_start - rest.len()))
}

/// The unlocking script of the first input of a serialized transaction.
fn coinbase_script(tx: &[u8]) -> Result<&[u8], WireError> {
    let mut rest = tx;
    skip(&mut rest, 4)?;
    let input_count = varint::read_varint(&mut rest)?;
    if input_count == 0 {
        return Err(WireError::Malformed("block"));
    }
    skip(&mut rest, 32 + 4)?;
    let script_len = varint::read_varint(&mut rest)?;
    if script_len > rest.len() as u64 {
        return Err(WireError::Truncated);
    }
    Ok(&rest[..script_len as usize])
}

fn skip(rest: &mut &[u8], n: usize) -> Result<(), WireError> {
    if rest.len() < n {
        return Err(WireError::Truncated);
    }
    *rest = &rest[n..];
    Ok(())
}

fn skip_u64(rest: &mut &[u8], n: u64) -> Result<(), WireError> {
    if n > rest.len() as u64 {
        return Err(WireError::Truncated);
    }
    skip(rest, n as usize)
}
