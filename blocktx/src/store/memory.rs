//! The in-memory store.

use std::{collections::HashMap, sync::Mutex, time::Instant};

use async_trait::async_trait;

use arc_helper::time::current_unix_timestamp;
use arc_types::{
    BlockGap, BlockRecord, ChainHash, RegisteredTransaction, StoreError, TransactionBlock,
};

use crate::constants::PRIMARY_LEASE;

use super::BlockTxStore;

/// [`BlockTxStore`] backed by plain maps, for `db_mode = memory` and tests.
#[derive(Default)]
pub struct InMemoryBlockTxStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_block_id: u64,
    blocks: Vec<BlockRecord>,
    /// block id → (tx hash, BUMP string), in association order.
    block_transactions: HashMap<u64, Vec<(ChainHash, String)>>,
    /// fingerprint → first registrant.
    registered: HashMap<ChainHash, String>,
    primary: Option<(String, Instant)>,
}

impl InMemoryBlockTxStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn block_by_hash(&self, hash: &ChainHash) -> Option<&BlockRecord> {
        self.blocks.iter().find(|b| &b.hash == hash)
    }

    /// The processed block containing `hash`, with its BUMP string.
    fn association(&self, hash: &ChainHash) -> Option<(&BlockRecord, &str)> {
        for block in &self.blocks {
            if block.processed_at.is_none() {
                continue;
            }
            if let Some((_, path)) = self
                .block_transactions
                .get(&block.id)
                .and_then(|txs| txs.iter().find(|(tx, _)| tx == hash))
            {
                return Some((block, path));
            }
        }
        None
    }
}

#[async_trait]
impl BlockTxStore for InMemoryBlockTxStore {
    async fn get_block(&self, hash: &ChainHash) -> Result<BlockRecord, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner.block_by_hash(hash).cloned().ok_or(StoreError::NotFound)
    }

    async fn insert_block(&self, block: &BlockRecord) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.block_by_hash(&block.hash) {
            return Ok(existing.id);
        }

        inner.next_block_id += 1;
        let id = inner.next_block_id;
        inner.blocks.push(BlockRecord {
            id,
            ..block.clone()
        });
        Ok(id)
    }

    async fn mark_block_as_done(
        &self,
        hash: &ChainHash,
        size: u64,
        tx_count: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let block = inner
            .blocks
            .iter_mut()
            .find(|b| &b.hash == hash)
            .ok_or(StoreError::NotFound)?;
        block.size = size;
        block.tx_count = tx_count;
        if block.processed_at.is_none() {
            block.processed_at = Some(current_unix_timestamp());
        }
        Ok(())
    }

    async fn register_transaction(
        &self,
        hash: ChainHash,
        source: &str,
    ) -> Result<RegisteredTransaction, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let owner = inner
            .registered
            .entry(hash)
            .or_insert_with(|| source.to_string())
            .clone();

        let (block_hash, block_height, merkle_path) = match inner.association(&hash) {
            Some((block, path)) => (Some(block.hash), block.height, Some(path.to_string())),
            None => (None, 0, None),
        };

        Ok(RegisteredTransaction {
            source: owner,
            block_hash,
            block_height,
            merkle_path,
        })
    }

    async fn get_transaction_blocks(
        &self,
        hashes: &[ChainHash],
    ) -> Result<Vec<TransactionBlock>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(hashes
            .iter()
            .filter_map(|hash| {
                inner.association(hash).map(|(block, _)| TransactionBlock {
                    tx_hash: *hash,
                    block_hash: block.hash,
                    block_height: block.height,
                })
            })
            .collect())
    }

    async fn get_transaction_merkle_path(&self, hash: &ChainHash) -> Result<String, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .association(hash)
            .map(|(_, path)| path.to_string())
            .ok_or(StoreError::NotFound)
    }

    async fn update_block_transactions(
        &self,
        block_id: u64,
        transactions: &[ChainHash],
        merkle_paths: &[String],
    ) -> Result<(), StoreError> {
        if transactions.len() != merkle_paths.len() {
            return Err(StoreError::Internal(
                "transactions and merkle paths must be the same length".into(),
            ));
        }

        let mut inner = self.inner.lock().unwrap();
        let rows = inner.block_transactions.entry(block_id).or_default();
        for (hash, path) in transactions.iter().zip(merkle_paths) {
            match rows.iter_mut().find(|(tx, _)| tx == hash) {
                Some((_, existing)) => *existing = path.clone(),
                None => rows.push((*hash, path.clone())),
            }
        }
        Ok(())
    }

    async fn get_block_gaps(&self, height_range: u64) -> Result<Vec<BlockGap>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let Some(max_height) = inner.blocks.iter().map(|b| b.height).max() else {
            return Ok(vec![]);
        };
        let min_height = inner.blocks.iter().map(|b| b.height).min().unwrap_or(0);

        let by_height: HashMap<u64, &BlockRecord> =
            inner.blocks.iter().map(|b| (b.height, b)).collect();
        // Heights below the earliest block on record are before our
        // observation window, not gaps.
        let floor = max_height.saturating_sub(height_range).max(min_height);

        let mut gaps = Vec::new();
        for height in (floor..=max_height).rev() {
            if by_height.contains_key(&height) {
                continue;
            }
            // Only report the gap if the block above it tells us what hash
            // to ask for.
            if let Some(above) = by_height.get(&(height + 1)) {
                gaps.push(BlockGap {
                    height,
                    hash: above.prev_hash,
                });
            }
        }
        Ok(gaps)
    }

    async fn get_primary(&self) -> Result<String, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .primary
            .as_ref()
            .map(|(host, _)| host.clone())
            .unwrap_or_default())
    }

    async fn try_to_become_primary(&self, host_name: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let claimable = match &inner.primary {
            None => true,
            Some((current, renewed_at)) => {
                current == host_name || renewed_at.elapsed() > PRIMARY_LEASE
            }
        };
        if claimable {
            inner.primary = Some((host_name.to_string(), Instant::now()));
        }
        Ok(())
    }

    async fn purge_older_than(&self, days: u32) -> Result<u64, StoreError> {
        let cutoff = current_unix_timestamp().saturating_sub(86_400 * u64::from(days));

        let mut inner = self.inner.lock().unwrap();
        let stale: Vec<u64> = inner
            .blocks
            .iter()
            .filter(|b| b.processed_at.is_some_and(|at| at < cutoff))
            .map(|b| b.id)
            .collect();
        for id in &stale {
            inner.block_transactions.remove(id);
        }
        inner
            .blocks
            .retain(|b| !b.processed_at.is_some_and(|at| at < cutoff));
        Ok(stale.len() as u64)
    }
}
