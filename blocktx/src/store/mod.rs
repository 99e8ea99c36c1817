//! Durable state behind the BlockTx engine.
//!
//! The engine only ever talks to [`BlockTxStore`]; the in-memory
//! implementation backs `db_mode = memory` and the tests. SQL and document
//! backends are integration points implementing the same trait.

mod memory;

use async_trait::async_trait;

use arc_types::{BlockGap, BlockRecord, ChainHash, RegisteredTransaction, StoreError, TransactionBlock};

pub use memory::InMemoryBlockTxStore;

/// The BlockTx persistence interface.
#[async_trait]
pub trait BlockTxStore: Send + Sync + 'static {
    /// Fetches a block row by hash.
    async fn get_block(&self, hash: &ChainHash) -> Result<BlockRecord, StoreError>;

    /// Inserts a block row, returning its store id.
    ///
    /// Re-inserting an existing hash returns the existing id; ingestion can
    /// be retried after a crash mid-association.
    async fn insert_block(&self, block: &BlockRecord) -> Result<u64, StoreError>;

    /// Finalizes a block: sets `processed_at`, size and transaction count.
    async fn mark_block_as_done(
        &self,
        hash: &ChainHash,
        size: u64,
        tx_count: u64,
    ) -> Result<(), StoreError>;

    /// Registers a transaction fingerprint for `source`.
    ///
    /// The first registrant wins; the canonical owner comes back together
    /// with any block association already known for the hash.
    async fn register_transaction(
        &self,
        hash: ChainHash,
        source: &str,
    ) -> Result<RegisteredTransaction, StoreError>;

    /// The block associations of any already-mined hashes in `hashes`.
    async fn get_transaction_blocks(
        &self,
        hashes: &[ChainHash],
    ) -> Result<Vec<TransactionBlock>, StoreError>;

    /// The BUMP string stored for a mined transaction.
    async fn get_transaction_merkle_path(&self, hash: &ChainHash) -> Result<String, StoreError>;

    /// Writes one batch of block/transaction associations with their BUMPs.
    ///
    /// Idempotent per `(block_id, tx_hash)`: re-running a batch after a
    /// fault must not duplicate rows.
    async fn update_block_transactions(
        &self,
        block_id: u64,
        transactions: &[ChainHash],
        merkle_paths: &[String],
    ) -> Result<(), StoreError>;

    /// Missing heights within the last `height_range` blocks, bounded
    /// below by the earliest block on record.
    ///
    /// A gap is only reported when the block above it is present, since
    /// that block's `prev_hash` is the expected hash of the missing one.
    async fn get_block_gaps(&self, height_range: u64) -> Result<Vec<BlockGap>, StoreError>;

    /// The hostname of the current primary, or an empty string.
    async fn get_primary(&self) -> Result<String, StoreError>;

    /// Atomically claims or renews the primary lease for `host_name`.
    ///
    /// No-op while another host's lease is fresh.
    async fn try_to_become_primary(&self, host_name: &str) -> Result<(), StoreError>;

    /// Drops blocks (and their associations) processed more than
    /// `days` days ago. Returns the number of blocks removed.
    async fn purge_older_than(&self, days: u32) -> Result<u64, StoreError>;
}
