//! The per-transaction state machine driver.

use std::sync::Arc;

use tokio::{
    sync::mpsc,
    time::{interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use arc_helper::time::current_unix_timestamp;
use arc_p2p::PeerNetwork;
use arc_types::{ChainHash, StoreError, TransactionRecord, TransactionStatus};

use crate::{
    blocktx_client::{self, BlockTxClient},
    constants::EXPIRED_TX_WINDOW,
    response::{ProcessorResponse, StatusAndError},
    response_map::ProcessorResponseMap,
    stats::ProcessorStats,
    store::MetamorphStore,
    Callbacker, MetamorphConfig, MetamorphError,
};

/// A submission entering the processor.
pub struct ProcessorRequest {
    pub record: TransactionRecord,
    /// Waiter channel of the submitting RPC call, if it is still around.
    pub response_channel: Option<mpsc::Sender<StatusAndError>>,
}

/// Drives every accepted transaction from STORED to a terminal status.
///
/// All mutation of a transaction's lifecycle funnels through here: the
/// submission path, inbound peer events, the retry and mined-reconciliation
/// loops. Status changes obey the monotonic rule — an update below the
/// current ordinal is ignored, REJECTED is terminal for the generic path,
/// and only the block-observation path may overwrite REJECTED with MINED.
pub struct Processor<B> {
    store: Arc<dyn MetamorphStore>,
    peers: Arc<dyn PeerNetwork>,
    blocktx: B,
    response_map: Arc<ProcessorResponseMap>,
    callbacker: Callbacker,
    stats: Arc<ProcessorStats>,
    host_name: String,
    max_monitored_txs: usize,
    max_retries: u32,
    record_retention_days: u32,
    check_if_mined_interval: std::time::Duration,
    process_expired_txs_interval: std::time::Duration,
    shutdown: CancellationToken,
}

impl<B> Processor<B>
where
    B: BlockTxClient,
    B::Future: Send,
{
    pub fn new(
        store: Arc<dyn MetamorphStore>,
        peers: Arc<dyn PeerNetwork>,
        blocktx: B,
        callbacker: Callbacker,
        stats: Arc<ProcessorStats>,
        config: &MetamorphConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            peers,
            blocktx,
            response_map: ProcessorResponseMap::new(config.cache_expiry_time),
            callbacker,
            stats,
            host_name: config.host_name.clone(),
            max_monitored_txs: config.max_monitored_txs,
            max_retries: config.max_retries,
            record_retention_days: config.record_retention_days,
            check_if_mined_interval: config.process_check_if_mined_interval,
            process_expired_txs_interval: config.process_expired_txs_interval,
            shutdown: CancellationToken::new(),
        })
    }

    /// Spawns the check-if-mined and expiry/retry loops.
    pub fn start_background_jobs(self: &Arc<Self>) {
        let span = info_span!("processor");

        let processor = Arc::clone(self);
        tokio::spawn(
            async move {
                let mut ticker = interval(processor.check_if_mined_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        () = processor.shutdown.cancelled() => return,
                        _ = ticker.tick() => {}
                    }
                    if let Err(err) = processor.check_if_mined().await {
                        warn!(%err, "check-if-mined sweep failed");
                    }
                }
            }
            .instrument(span.clone()),
        );

        let processor = Arc::clone(self);
        tokio::spawn(
            async move {
                let mut ticker = interval(processor.process_expired_txs_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        () = processor.shutdown.cancelled() => return,
                        _ = ticker.tick() => {}
                    }
                    processor.process_expired_transactions().await;
                }
            }
            .instrument(span.clone()),
        );

        let processor = Arc::clone(self);
        tokio::spawn(
            async move {
                let mut ticker = interval(crate::constants::RETENTION_SWEEP_INTERVAL);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        () = processor.shutdown.cancelled() => return,
                        _ = ticker.tick() => {}
                    }
                    match processor
                        .store
                        .purge_older_than(processor.record_retention_days)
                        .await
                    {
                        Ok(0) => {}
                        Ok(removed) => info!(removed, "purged terminal records"),
                        Err(err) => warn!(%err, "retention sweep failed"),
                    }
                }
            }
            .instrument(span),
        );
    }

    /// Accepts one submission: persist, announce, track.
    ///
    /// Every step reports to the waiter channel; a fingerprint already
    /// rejected terminally re-emits REJECTED and goes no further.
    pub async fn process_transaction(&self, request: ProcessorRequest) {
        let hash = request.record.hash;
        let entry = Arc::new(match request.response_channel {
            Some(channel) => {
                ProcessorResponse::with_channel(hash, TransactionStatus::Received, channel)
            }
            None => ProcessorResponse::with_status(hash, TransactionStatus::Received),
        });

        self.stats.incr(&self.stats.received);
        entry.set_status(TransactionStatus::Received);

        match self.store.get(&hash).await {
            Ok(existing) if existing.status == TransactionStatus::Rejected => {
                entry.set_err(existing.reject_reason);
                entry.set_status(TransactionStatus::Rejected);
                return;
            }
            Ok(_) | Err(StoreError::NotFound) => {}
            Err(err) => debug!(%hash, %err, "pre-insert store read failed"),
        }

        let mut record = request.record;
        record.status = TransactionStatus::Stored;
        record.stored_at = Some(current_unix_timestamp());
        record.locked_by = self.host_name.clone();
        if let Err(err) = self.store.set(record).await {
            error!(%hash, %err, "failed to store transaction");
            entry.set_err(Some(err.to_string()));
            entry.set_status(TransactionStatus::Stored);
            return;
        }
        self.stats.incr(&self.stats.stored);
        entry.set_status(TransactionStatus::Stored);

        self.peers.announce_transaction(hash);
        if let Err(err) = self
            .store
            .update_status(&hash, TransactionStatus::AnnouncedToNetwork, None)
            .await
        {
            warn!(%hash, %err, "failed to persist announced status");
        }
        self.stats.incr(&self.stats.announced);
        entry.set_status(TransactionStatus::AnnouncedToNetwork);

        self.response_map.set(hash, entry);
    }

    /// Applies a status observed from the network to a tracked transaction.
    ///
    /// Returns `Ok(false)` when the transaction is not in flight here or
    /// the update loses against the monotonic rule.
    pub async fn send_status_for_transaction(
        &self,
        hash: &ChainHash,
        status: TransactionStatus,
        source: &str,
        err: Option<String>,
    ) -> Result<bool, MetamorphError> {
        let Some(entry) = self.response_map.get(hash) else {
            return Ok(false);
        };

        let current = entry.status();
        if current.is_terminal() {
            debug!(%hash, %current, new = %status, source, "ignoring status update");
            return Ok(false);
        }
        // REJECTED sits mid-ordering but is accepted from any non-terminal
        // state; everything else obeys the monotonic rule.
        if status != TransactionStatus::Rejected && status.ordinal() < current.ordinal() {
            debug!(%hash, %current, new = %status, source, "ignoring status update");
            return Ok(false);
        }

        debug!(%hash, %status, source, "status update");
        match status {
            TransactionStatus::Rejected => {
                entry.set_err(err.clone());
                entry.set_status(status);
                self.stats.incr(&self.stats.rejected);
                self.store
                    .update_status(hash, status, err.as_deref())
                    .await?;
                self.response_map.delete(hash);
            }
            TransactionStatus::SeenOnNetwork => {
                entry.set_status(status);
                self.stats.incr(&self.stats.seen);
                self.store.update_status(hash, status, None).await?;
                // One best-effort notification; the final one comes with
                // MINED.
                if let Ok(record) = self.store.get(hash).await {
                    if record.callback_url.is_some() {
                        self.callbacker.dispatch_once(record);
                    }
                }
            }
            TransactionStatus::Mined | TransactionStatus::Confirmed => {
                entry.set_status(status);
                self.stats.incr(&self.stats.mined);
                self.store.update_status(hash, status, None).await?;
                if let Ok(record) = self.store.get(hash).await {
                    if record.callback_url.is_some() {
                        self.callbacker.dispatch(record);
                    }
                }
                self.response_map.delete(hash);
            }
            _ => {
                entry.set_status(status);
                match status {
                    TransactionStatus::RequestedByNetwork => {
                        self.stats.incr(&self.stats.requested);
                    }
                    TransactionStatus::SentToNetwork => self.stats.incr(&self.stats.sent),
                    _ => {}
                }
                self.store.update_status(hash, status, None).await?;
            }
        }

        Ok(true)
    }

    /// Applies a mined observation from BlockTx.
    ///
    /// This is the authoritative path: it overwrites REJECTED, sets the
    /// block association, fires the final callback and evicts the entry.
    /// Idempotent.
    pub async fn send_status_mined_for_transaction(
        &self,
        hash: &ChainHash,
        block_hash: &ChainHash,
        block_height: u64,
    ) -> Result<bool, MetamorphError> {
        self.store
            .update_mined(hash, block_hash, block_height)
            .await?;
        self.stats.incr(&self.stats.mined);

        match self.store.get(hash).await {
            Ok(record) if record.callback_url.is_some() => self.callbacker.dispatch(record),
            Ok(_) => {}
            Err(err) => warn!(%hash, %err, "mined record unreadable for callback"),
        }

        if let Some(entry) = self.response_map.get(hash) {
            entry.set_status(TransactionStatus::Mined);
        }
        self.response_map.delete(hash);

        info!(%hash, block = %block_hash, height = block_height, "transaction mined");
        Ok(true)
    }

    /// Re-enters unmined store rows into the response map at startup and
    /// reconciles any that were mined while we were away.
    pub async fn load_unmined(&self) {
        let records = match self.store.get_unmined(self.max_monitored_txs).await {
            Ok(records) => records,
            Err(err) => {
                error!(%err, "failed to load unmined transactions");
                return;
            }
        };
        if records.is_empty() {
            return;
        }
        info!(count = records.len(), "reloading unmined transactions");

        let mut hashes = Vec::with_capacity(records.len());
        for record in records {
            self.response_map.set(
                record.hash,
                Arc::new(ProcessorResponse::with_status(record.hash, record.status)),
            );
            hashes.push(record.hash);
        }

        match blocktx_client::transaction_blocks(&self.blocktx, hashes).await {
            Ok(blocks) => {
                for tb in blocks {
                    if let Err(err) = self
                        .send_status_mined_for_transaction(
                            &tb.tx_hash,
                            &tb.block_hash,
                            tb.block_height,
                        )
                        .await
                    {
                        warn!(hash = %tb.tx_hash, %err, "failed to reconcile mined transaction");
                    }
                }
            }
            Err(err) => warn!(%err, "failed to query mined state for reloaded transactions"),
        }
    }

    /// One sweep of the mined-reconciliation loop.
    pub async fn check_if_mined(&self) -> Result<(), MetamorphError> {
        let hashes = self.response_map.hashes(|entry| {
            matches!(
                entry.status(),
                TransactionStatus::SeenOnNetwork | TransactionStatus::AcceptedByNetwork,
            )
        });
        if hashes.is_empty() {
            return Ok(());
        }

        let blocks = blocktx_client::transaction_blocks(&self.blocktx, hashes).await?;
        for tb in blocks {
            if let Err(err) = self
                .send_status_mined_for_transaction(&tb.tx_hash, &tb.block_hash, tb.block_height)
                .await
            {
                warn!(hash = %tb.tx_hash, %err, "failed to apply mined status");
            }
        }
        Ok(())
    }

    /// One sweep of the expiry/retry loop.
    ///
    /// Transactions stuck below SEEN_ON_NETWORK past the expiry window are
    /// re-announced up to `max_retries` times, then rejected as expired.
    pub async fn process_expired_transactions(&self) {
        let stale = self.response_map.items(|entry| {
            entry.start().elapsed() > EXPIRED_TX_WINDOW
                && entry.status() < TransactionStatus::SeenOnNetwork
        });

        for (hash, entry) in stale {
            let retries = entry.increment_retry();
            if retries > self.max_retries {
                warn!(%hash, retries, "giving up on transaction");
                if let Err(err) = self
                    .send_status_for_transaction(
                        &hash,
                        TransactionStatus::Rejected,
                        "expiry",
                        Some("transaction expired".to_string()),
                    )
                    .await
                {
                    warn!(%hash, %err, "failed to reject expired transaction");
                }
                continue;
            }

            debug!(%hash, retries, "re-announcing expired transaction");
            self.peers.announce_transaction(hash);
        }
    }

    /// Stops the loops and releases this host's record locks.
    pub async fn shutdown(&self) {
        info!("shutting down processor");
        self.shutdown.cancel();

        let hashes = self.response_map.hashes(|_| true);
        if !hashes.is_empty() {
            if let Err(err) = self.store.set_unlocked(&hashes).await {
                error!(%err, "failed to unlock records on shutdown");
            }
        }
        self.response_map.close();
    }

    /// The (connected, disconnected) peer address lists.
    pub fn peers(&self) -> (Vec<String>, Vec<String>) {
        self.peers.get_peers()
    }

    /// Number of transactions currently tracked in memory.
    pub fn in_flight(&self) -> usize {
        self.response_map.len()
    }

    /// Whether `hash` currently has a response-map entry.
    pub fn is_tracked(&self, hash: &ChainHash) -> bool {
        self.response_map.get(hash).is_some()
    }

    pub fn stats(&self) -> &ProcessorStats {
        &self.stats
    }
}
