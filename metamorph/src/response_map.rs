//! The in-memory index of in-flight transactions.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use arc_types::ChainHash;

use crate::{constants::CLEANUP_INTERVAL, response::ProcessorResponse};

/// All transactions currently in flight, keyed by fingerprint.
///
/// Entries are pointer-stable (`Arc`) so readers can keep working with an
/// entry while others mutate its counters. A background sweeper evicts
/// entries older than `expiry`; terminal statuses evict immediately via
/// [`delete`](Self::delete).
pub struct ProcessorResponseMap {
    expiry: Duration,
    items: DashMap<ChainHash, Arc<ProcessorResponse>>,
    shutdown: CancellationToken,
}

impl ProcessorResponseMap {
    /// Creates the map and starts its cleanup sweeper.
    pub fn new(expiry: Duration) -> Arc<Self> {
        let map = Arc::new(Self {
            expiry,
            items: DashMap::new(),
            shutdown: CancellationToken::new(),
        });

        let sweeper = Arc::clone(&map);
        tokio::spawn(async move {
            let mut ticker = interval(CLEANUP_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = sweeper.shutdown.cancelled() => return,
                    _ = ticker.tick() => sweeper.clean(),
                }
            }
        });

        map
    }

    pub fn set(&self, hash: ChainHash, response: Arc<ProcessorResponse>) {
        self.items.insert(hash, response);
    }

    pub fn get(&self, hash: &ChainHash) -> Option<Arc<ProcessorResponse>> {
        self.items.get(hash).map(|entry| Arc::clone(&entry))
    }

    pub fn delete(&self, hash: &ChainHash) {
        self.items.remove(hash);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn retries(&self, hash: &ChainHash) -> u32 {
        self.get(hash).map(|e| e.retries()).unwrap_or(0)
    }

    pub fn increment_retry(&self, hash: &ChainHash) -> u32 {
        self.get(hash).map(|e| e.increment_retry()).unwrap_or(0)
    }

    /// The hashes of entries passing `filter`.
    pub fn hashes(&self, filter: impl Fn(&ProcessorResponse) -> bool) -> Vec<ChainHash> {
        self.items
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| *entry.key())
            .collect()
    }

    /// A snapshot of the entries passing `filter`.
    pub fn items(
        &self,
        filter: impl Fn(&ProcessorResponse) -> bool,
    ) -> Vec<(ChainHash, Arc<ProcessorResponse>)> {
        self.items
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }

    /// Evicts entries older than the map's expiry.
    pub fn clean(&self) {
        let expiry = self.expiry;
        self.items.retain(|hash, entry| {
            let keep = entry.start().elapsed() <= expiry;
            if !keep {
                debug!(%hash, "expiring response map entry");
            }
            keep
        });
    }

    /// Drops every entry (closing the waiter channels) and stops the
    /// sweeper.
    pub fn close(&self) {
        self.shutdown.cancel();
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use arc_types::TransactionStatus;

    use super::*;

    fn entry(hash: ChainHash, status: TransactionStatus) -> Arc<ProcessorResponse> {
        Arc::new(ProcessorResponse::with_status(hash, status))
    }

    #[tokio::test]
    async fn set_get_delete() {
        let map = ProcessorResponseMap::new(Duration::from_secs(60));
        let hash = ChainHash::double_sha256(b"tx");

        assert!(map.get(&hash).is_none());
        map.set(hash, entry(hash, TransactionStatus::Stored));
        assert_eq!(map.get(&hash).unwrap().status(), TransactionStatus::Stored);
        assert_eq!(map.len(), 1);

        map.delete(&hash);
        assert!(map.get(&hash).is_none());
        map.close();
    }

    #[tokio::test]
    async fn filtered_hashes() {
        let map = ProcessorResponseMap::new(Duration::from_secs(60));
        let seen = ChainHash::double_sha256(b"seen");
        let stored = ChainHash::double_sha256(b"stored");
        map.set(seen, entry(seen, TransactionStatus::SeenOnNetwork));
        map.set(stored, entry(stored, TransactionStatus::Stored));

        let hashes = map.hashes(|e| e.status() == TransactionStatus::SeenOnNetwork);
        assert_eq!(hashes, vec![seen]);
        map.close();
    }

    #[tokio::test(start_paused = true)]
    async fn clean_expires_old_entries() {
        let map = ProcessorResponseMap::new(Duration::from_secs(60));
        let old = ChainHash::double_sha256(b"old");
        map.set(old, entry(old, TransactionStatus::Stored));

        tokio::time::advance(Duration::from_secs(61)).await;
        let fresh = ChainHash::double_sha256(b"fresh");
        map.set(fresh, entry(fresh, TransactionStatus::Stored));

        map.clean();
        assert!(map.get(&old).is_none());
        assert!(map.get(&fresh).is_some());
        map.close();
    }
}
