//! Durable per-transaction state.
//!
//! Everything Metamorph knows about a transaction that must survive a
//! restart lives behind [`MetamorphStore`]. The in-memory implementation
//! backs `db_mode = memory` and the tests.

mod memory;

use async_trait::async_trait;

use arc_types::{ChainHash, StoreError, TransactionRecord, TransactionStatus};

pub use memory::InMemoryMetamorphStore;

/// The Metamorph persistence interface.
#[async_trait]
pub trait MetamorphStore: Send + Sync + 'static {
    /// Fetches a record by fingerprint.
    async fn get(&self, hash: &ChainHash) -> Result<TransactionRecord, StoreError>;

    /// Creates or replaces a record.
    async fn set(&self, record: TransactionRecord) -> Result<(), StoreError>;

    /// Moves a record to `status`, storing the reject reason if given.
    ///
    /// Stamps `announced_at` on the transition to
    /// [`TransactionStatus::AnnouncedToNetwork`].
    async fn update_status(
        &self,
        hash: &ChainHash,
        status: TransactionStatus,
        reject_reason: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Marks a record mined: status, block association and `mined_at`.
    async fn update_mined(
        &self,
        hash: &ChainHash,
        block_hash: &ChainHash,
        block_height: u64,
    ) -> Result<(), StoreError>;

    /// Up to `limit` records whose status is not terminal, oldest first.
    async fn get_unmined(&self, limit: usize) -> Result<Vec<TransactionRecord>, StoreError>;

    /// Releases this host's lock on the given fingerprints.
    async fn set_unlocked(&self, hashes: &[ChainHash]) -> Result<(), StoreError>;

    /// Releases every lock held by `name`, returning the affected count.
    async fn set_unlocked_by_name(&self, name: &str) -> Result<u64, StoreError>;

    /// Drops terminal records older than `days` days. Returns the number
    /// removed.
    async fn purge_older_than(&self, days: u32) -> Result<u64, StoreError>;
}
