//! Block ingestion and the background maintenance loops.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use arc_helper::ttl::TtlMap;
use arc_p2p::{BoxError, NetworkPeer, PeerNetwork};
use arc_types::{BlockRecord, ChainHash};
use arc_wire::{BlockMessage, Reject};

use crate::{
    constants::{ANNOUNCED_CACHE_TTL, BLOCK_GAP_RANGE, RETENTION_SWEEP_INTERVAL},
    merkle::{build_merkle_tree, merkle_root, Bump},
    store::BlockTxStore,
    BlockTxConfig, BlockTxError,
};

/// The BlockTx side of a peer connection.
///
/// Fed by the p2p layer with block announcements and full blocks; drives
/// each block through insert → associate (in batches) → done, and runs the
/// primary-only maintenance loops (gap filling, retention).
#[derive(Clone)]
pub struct PeerHandler {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn BlockTxStore>,
    /// Block hashes currently being fetched, with the peers that announced
    /// them. A hash in here is not requested a second time.
    announced: Mutex<TtlMap<ChainHash, Vec<String>>>,
    starting_height: u64,
    batch_size: usize,
    retention_days: u32,
    fill_gaps_interval: std::time::Duration,
    become_primary_interval: std::time::Duration,
    host_name: String,
    shutdown: CancellationToken,
}

impl PeerHandler {
    pub fn new(store: Arc<dyn BlockTxStore>, config: &BlockTxConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                announced: Mutex::new(TtlMap::new(ANNOUNCED_CACHE_TTL)),
                starting_height: config.starting_block_height,
                batch_size: config.transaction_batch_size.max(1),
                retention_days: config.record_retention_days,
                fill_gaps_interval: config.fill_gaps_interval,
                become_primary_interval: config.become_primary_interval,
                host_name: config.host_name.clone(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Spawns the primary-election, gap-filling and retention loops.
    pub fn start_background_jobs(&self, peers: Arc<dyn PeerNetwork>) {
        let span = info_span!("blocktx");

        let handler = self.clone();
        tokio::spawn(
            async move {
                let mut ticker = interval(handler.inner.become_primary_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        () = handler.inner.shutdown.cancelled() => return,
                        _ = ticker.tick() => {}
                    }
                    let host = handler.inner.host_name.clone();
                    if let Err(err) = handler.inner.store.try_to_become_primary(&host).await {
                        warn!(%err, "failed to try to become primary");
                    }
                }
            }
            .instrument(span.clone()),
        );

        let handler = self.clone();
        let gap_peers = Arc::clone(&peers);
        tokio::spawn(
            async move {
                let mut ticker = interval(handler.inner.fill_gaps_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        () = handler.inner.shutdown.cancelled() => return,
                        _ = ticker.tick() => {}
                    }
                    if let Err(err) = handler.fill_gaps(&*gap_peers).await {
                        warn!(%err, "gap fill failed");
                    }
                }
            }
            .instrument(span.clone()),
        );

        let handler = self.clone();
        tokio::spawn(
            async move {
                let mut ticker = interval(RETENTION_SWEEP_INTERVAL);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        () = handler.inner.shutdown.cancelled() => return,
                        _ = ticker.tick() => {}
                    }
                    if let Err(err) = handler.purge_old_blocks().await {
                        warn!(%err, "retention sweep failed");
                    }
                }
            }
            .instrument(span),
        );
    }

    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Ingests one block: insert the row, write associations and BUMPs in
    /// batches, then mark it done.
    ///
    /// Safe to call twice for the same block; a finalized row deduplicates
    /// and an unfinalized one resumes association (the writes are
    /// idempotent).
    pub async fn process_block(&self, block: &BlockMessage) -> Result<(), BlockTxError> {
        let inner = &self.inner;

        if block.height < inner.starting_height {
            debug!(hash = %block.hash, height = block.height, "ignoring block below starting height");
            return Ok(());
        }

        let block_id = match inner.store.get_block(&block.hash).await {
            Ok(existing) if existing.processed_at.is_some() => {
                debug!(hash = %block.hash, "block already processed, deduplicating");
                inner.announced.lock().unwrap().remove(&block.hash);
                return Ok(());
            }
            Ok(existing) => existing.id,
            Err(err) if err.is_not_found() => {
                inner
                    .store
                    .insert_block(&BlockRecord {
                        id: 0,
                        hash: block.hash,
                        prev_hash: block.header.prev_hash,
                        merkle_root: block.header.merkle_root,
                        height: block.height,
                        processed_at: None,
                        size: block.size,
                        tx_count: block.transaction_hashes.len() as u64,
                    })
                    .await?
            }
            Err(err) => return Err(err.into()),
        };

        let levels = build_merkle_tree(&block.transaction_hashes);
        if merkle_root(&levels) != block.header.merkle_root {
            // Validation is not our job, but a mismatch poisons every proof
            // we'd hand out for this block.
            warn!(hash = %block.hash, "computed merkle root does not match the header");
        }

        for (chunk_index, chunk) in block
            .transaction_hashes
            .chunks(inner.batch_size)
            .enumerate()
        {
            let base = chunk_index * inner.batch_size;
            let mut merkle_paths = Vec::with_capacity(chunk.len());
            for offset in 0..chunk.len() {
                let bump = Bump::from_tree(block.height, &levels, (base + offset) as u64)?;
                merkle_paths.push(bump.to_string());
            }
            inner
                .store
                .update_block_transactions(block_id, chunk, &merkle_paths)
                .await?;
        }

        inner
            .store
            .mark_block_as_done(&block.hash, block.size, block.transaction_hashes.len() as u64)
            .await?;
        inner.announced.lock().unwrap().remove(&block.hash);

        info!(
            hash = %block.hash,
            height = block.height,
            txs = block.transaction_hashes.len(),
            "block processed",
        );
        Ok(())
    }

    /// Requests every block the store is missing in the recent range.
    ///
    /// Runs on the primary only; other instances return immediately.
    pub async fn fill_gaps(&self, peers: &dyn PeerNetwork) -> Result<(), BlockTxError> {
        let inner = &self.inner;

        let primary = inner.store.get_primary().await?;
        if primary != inner.host_name {
            debug!(%primary, "not primary, skipping gap fill");
            return Ok(());
        }

        let gaps = inner.store.get_block_gaps(BLOCK_GAP_RANGE).await?;
        if gaps.is_empty() {
            return Ok(());
        }

        for gap in gaps {
            if inner.announced.lock().unwrap().contains_key(&gap.hash) {
                continue;
            }
            info!(height = gap.height, hash = %gap.hash, "requesting missing block");
            if peers.request_block(gap.hash) {
                inner.announced.lock().unwrap().insert(gap.hash, Vec::new());
            } else {
                warn!(height = gap.height, "no connected peer to request block from");
            }
        }
        Ok(())
    }

    async fn purge_old_blocks(&self) -> Result<(), BlockTxError> {
        let inner = &self.inner;
        if inner.store.get_primary().await? != inner.host_name {
            return Ok(());
        }
        let removed = inner.store.purge_older_than(inner.retention_days).await?;
        if removed > 0 {
            info!(removed, days = inner.retention_days, "purged old blocks");
        }
        Ok(())
    }
}

#[async_trait]
impl arc_p2p::PeerHandler for PeerHandler {
    async fn transaction_announced(
        &self,
        _hash: ChainHash,
        _peer: &dyn NetworkPeer,
    ) -> Result<(), BoxError> {
        // BlockTx does not track loose transactions.
        Ok(())
    }

    async fn block_announced(
        &self,
        hash: ChainHash,
        peer: &dyn NetworkPeer,
    ) -> Result<(), BoxError> {
        {
            let mut announced = self.inner.announced.lock().unwrap();
            if let Some(peers) = announced.get_mut(&hash) {
                // Another peer is already delivering this block.
                peers.push(peer.address().to_string());
                return Ok(());
            }
            announced.insert(hash, vec![peer.address().to_string()]);
        }

        peer.request_block(hash);
        Ok(())
    }

    async fn transaction_requested(&self, _hash: ChainHash) -> Result<Option<Vec<u8>>, BoxError> {
        Ok(None)
    }

    async fn transaction_sent(&self, _hash: ChainHash) -> Result<(), BoxError> {
        Ok(())
    }

    async fn transaction_rejected(
        &self,
        _reject: Reject,
        _peer: &dyn NetworkPeer,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    async fn block_received(
        &self,
        block: BlockMessage,
        _peer: &dyn NetworkPeer,
    ) -> Result<(), BoxError> {
        self.process_block(&block).await.map_err(Into::into)
    }
}
