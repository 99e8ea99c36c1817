//! The in-memory store.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;

use arc_helper::time::current_unix_timestamp;
use arc_types::{ChainHash, StoreError, TransactionRecord, TransactionStatus, LOCKED_BY_NONE};

use super::MetamorphStore;

/// [`MetamorphStore`] backed by a map, for `db_mode = memory` and tests.
#[derive(Default)]
pub struct InMemoryMetamorphStore {
    records: RwLock<HashMap<ChainHash, TransactionRecord>>,
}

impl InMemoryMetamorphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetamorphStore for InMemoryMetamorphStore {
    async fn get(&self, hash: &ChainHash) -> Result<TransactionRecord, StoreError> {
        self.records
            .read()
            .unwrap()
            .get(hash)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn set(&self, record: TransactionRecord) -> Result<(), StoreError> {
        self.records.write().unwrap().insert(record.hash, record);
        Ok(())
    }

    async fn update_status(
        &self,
        hash: &ChainHash,
        status: TransactionStatus,
        reject_reason: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().unwrap();
        let record = records.get_mut(hash).ok_or(StoreError::NotFound)?;
        record.status = status;
        if let Some(reason) = reject_reason {
            record.reject_reason = Some(reason.to_string());
        }
        if status == TransactionStatus::AnnouncedToNetwork && record.announced_at.is_none() {
            record.announced_at = Some(current_unix_timestamp());
        }
        Ok(())
    }

    async fn update_mined(
        &self,
        hash: &ChainHash,
        block_hash: &ChainHash,
        block_height: u64,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().unwrap();
        let record = records.get_mut(hash).ok_or(StoreError::NotFound)?;
        record.status = TransactionStatus::Mined;
        record.block_hash = Some(*block_hash);
        record.block_height = block_height;
        if record.mined_at.is_none() {
            record.mined_at = Some(current_unix_timestamp());
        }
        Ok(())
    }

    async fn get_unmined(&self, limit: usize) -> Result<Vec<TransactionRecord>, StoreError> {
        let records = self.records.read().unwrap();
        let mut unmined: Vec<TransactionRecord> = records
            .values()
            .filter(|r| !r.status.is_terminal())
            .cloned()
            .collect();
        unmined.sort_by_key(|r| r.stored_at);
        unmined.truncate(limit);
        Ok(unmined)
    }

    async fn set_unlocked(&self, hashes: &[ChainHash]) -> Result<(), StoreError> {
        let mut records = self.records.write().unwrap();
        for hash in hashes {
            if let Some(record) = records.get_mut(hash) {
                record.locked_by = LOCKED_BY_NONE.to_string();
            }
        }
        Ok(())
    }

    async fn set_unlocked_by_name(&self, name: &str) -> Result<u64, StoreError> {
        let mut records = self.records.write().unwrap();
        let mut affected = 0;
        for record in records.values_mut() {
            if record.locked_by == name {
                record.locked_by = LOCKED_BY_NONE.to_string();
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn purge_older_than(&self, days: u32) -> Result<u64, StoreError> {
        let cutoff = current_unix_timestamp().saturating_sub(86_400 * u64::from(days));
        let mut records = self.records.write().unwrap();
        let before = records.len();
        records.retain(|_, r| {
            let terminal_at = r.mined_at.or(r.stored_at);
            !(r.status.is_terminal() && terminal_at.is_some_and(|at| at < cutoff))
        });
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(raw: &[u8], locked_by: &str) -> TransactionRecord {
        let mut record = TransactionRecord::new(raw.to_vec());
        record.status = TransactionStatus::Stored;
        record.stored_at = Some(current_unix_timestamp());
        record.locked_by = locked_by.to_string();
        record
    }

    #[tokio::test]
    async fn get_set_round_trip() {
        let store = InMemoryMetamorphStore::new();
        let record = record(b"raw tx", "host-a");
        let hash = record.hash;

        assert!(matches!(store.get(&hash).await, Err(StoreError::NotFound)));
        store.set(record.clone()).await.unwrap();
        assert_eq!(store.get(&hash).await.unwrap(), record);
    }

    #[tokio::test]
    async fn status_updates_stamp_timestamps() {
        let store = InMemoryMetamorphStore::new();
        let record = record(b"raw tx", "host-a");
        let hash = record.hash;
        store.set(record).await.unwrap();

        store
            .update_status(&hash, TransactionStatus::AnnouncedToNetwork, None)
            .await
            .unwrap();
        let stored = store.get(&hash).await.unwrap();
        assert_eq!(stored.status, TransactionStatus::AnnouncedToNetwork);
        assert!(stored.announced_at.is_some());

        store
            .update_status(&hash, TransactionStatus::Rejected, Some("dust"))
            .await
            .unwrap();
        let stored = store.get(&hash).await.unwrap();
        assert_eq!(stored.reject_reason.as_deref(), Some("dust"));
    }

    #[tokio::test]
    async fn update_mined_sets_the_block_association() {
        let store = InMemoryMetamorphStore::new();
        let record = record(b"raw tx", "host-a");
        let hash = record.hash;
        store.set(record).await.unwrap();

        let block_hash = ChainHash::double_sha256(b"block");
        store.update_mined(&hash, &block_hash, 822_014).await.unwrap();

        let stored = store.get(&hash).await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Mined);
        assert_eq!(stored.block_hash, Some(block_hash));
        assert_eq!(stored.block_height, 822_014);
        assert!(stored.mined_at.is_some());
    }

    #[tokio::test]
    async fn unmined_excludes_terminal_and_respects_the_limit() {
        let store = InMemoryMetamorphStore::new();
        for i in 0u8..5 {
            store.set(record(&[i], "host-a")).await.unwrap();
        }
        let mined = record(b"mined", "host-a");
        let mined_hash = mined.hash;
        store.set(mined).await.unwrap();
        store
            .update_mined(&mined_hash, &ChainHash::double_sha256(b"b"), 1)
            .await
            .unwrap();

        assert_eq!(store.get_unmined(100).await.unwrap().len(), 5);
        assert_eq!(store.get_unmined(3).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unlock_by_name_counts_affected_rows() {
        let store = InMemoryMetamorphStore::new();
        store.set(record(b"one", "host-a")).await.unwrap();
        store.set(record(b"two", "host-a")).await.unwrap();
        store.set(record(b"three", "host-b")).await.unwrap();

        assert_eq!(store.set_unlocked_by_name("host-a").await.unwrap(), 2);
        assert_eq!(store.set_unlocked_by_name("host-a").await.unwrap(), 0);

        let remaining = store.get_unmined(10).await.unwrap();
        assert_eq!(
            remaining.iter().filter(|r| r.locked_by == "host-b").count(),
            1,
        );
    }
}
