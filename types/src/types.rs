//! Records persisted by the service stores.

use serde::{Deserialize, Serialize};

use crate::{ChainHash, TransactionStatus};

/// Sentinel value for [`TransactionRecord::locked_by`] meaning no Metamorph
/// instance currently owns the record.
pub const LOCKED_BY_NONE: &str = "NONE";

/// Which store backend a service runs against.
///
/// Only `memory` ships in-tree; the other modes name the integration points
/// external drivers plug into.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DbMode {
    #[default]
    Memory,
    EmbeddedSql,
    ExternalSql,
    DocumentDb,
}

/// A transaction as persisted by the Metamorph store.
///
/// Created exactly once per fingerprint on the first accepted submission and
/// mutated by the processor afterwards. Timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// The fingerprint: double-SHA-256 of `raw_tx`.
    pub hash: ChainHash,
    /// The raw transaction bytes as submitted.
    #[serde(skip)]
    pub raw_tx: Vec<u8>,
    pub status: TransactionStatus,
    pub reject_reason: Option<String>,
    pub callback_url: Option<String>,
    pub callback_token: Option<String>,
    /// Set once the transaction is mined.
    pub block_hash: Option<ChainHash>,
    /// Zero until the transaction is mined.
    pub block_height: u64,
    pub stored_at: Option<u64>,
    pub announced_at: Option<u64>,
    pub mined_at: Option<u64>,
    /// Hostname of the owning Metamorph instance, or [`LOCKED_BY_NONE`].
    pub locked_by: String,
}

impl TransactionRecord {
    /// A fresh record for a submission, not yet persisted.
    pub fn new(raw_tx: Vec<u8>) -> Self {
        Self {
            hash: ChainHash::double_sha256(&raw_tx),
            raw_tx,
            status: TransactionStatus::Unknown,
            reject_reason: None,
            callback_url: None,
            callback_token: None,
            block_hash: None,
            block_height: 0,
            stored_at: None,
            announced_at: None,
            mined_at: None,
            locked_by: LOCKED_BY_NONE.to_string(),
        }
    }
}

/// A block header row as persisted by the BlockTx store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Store-assigned id, referenced by the block/transaction map.
    pub id: u64,
    pub hash: ChainHash,
    pub prev_hash: ChainHash,
    pub merkle_root: ChainHash,
    pub height: u64,
    /// Unix seconds; `None` until the block is fully associated.
    pub processed_at: Option<u64>,
    pub size: u64,
    pub tx_count: u64,
}

/// A mined transaction's block association, as answered by BlockTx.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBlock {
    pub tx_hash: ChainHash,
    pub block_hash: ChainHash,
    pub block_height: u64,
}

/// A missing height found by the gap query.
///
/// `hash` is the expected hash of the missing block, taken from the
/// `prev_hash` of the block one height above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockGap {
    pub height: u64,
    pub hash: ChainHash,
}

/// The result of registering a transaction with BlockTx.
///
/// `source` is the canonical owner for the fingerprint — the hostname of the
/// first Metamorph instance that registered it. If BlockTx has already seen
/// the transaction in a block, the association travels back here too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredTransaction {
    pub source: String,
    pub block_hash: Option<ChainHash>,
    pub block_height: u64,
    pub merkle_path: Option<String>,
}
