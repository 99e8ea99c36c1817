//! The synchronous service boundary.
//!
//! `put_transaction` is the front door: it registers the fingerprint with
//! BlockTx, routes the request to its owning instance if another Metamorph
//! got there first, short-circuits already-known records, and otherwise
//! feeds the processor and waits (bounded) for the requested status.

use std::{pin::pin, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{sync::mpsc, time::sleep};
use tracing::{debug, error, info, warn};

use arc_helper::time::current_unix_timestamp;
use arc_types::{ChainHash, StoreError, TransactionRecord, TransactionStatus};

use crate::{
    blocktx_client::{self, BlockTxClient},
    constants::{RESPONSE_TIMEOUT, WAITER_CHANNEL_CAPACITY},
    processor::{Processor, ProcessorRequest},
    store::MetamorphStore,
    MetamorphError,
};

/// One transaction submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub raw_tx: Vec<u8>,
    pub callback_url: Option<String>,
    pub callback_token: Option<String>,
    /// Status to wait for before answering; SEEN_ON_NETWORK if unset.
    pub wait_for_status: Option<TransactionStatus>,
    /// Set on instance-to-instance forwards. A request that arrives with
    /// this flag is never forwarded again.
    pub forwarded: bool,
}

impl TransactionRequest {
    pub fn new(raw_tx: Vec<u8>) -> Self {
        Self {
            raw_tx,
            callback_url: None,
            callback_token: None,
            wait_for_status: None,
            forwarded: false,
        }
    }
}

/// The status record answered by the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionStatusReply {
    pub txid: String,
    pub status: TransactionStatus,
    pub block_hash: Option<ChainHash>,
    pub block_height: u64,
    pub reject_reason: Option<String>,
    pub merkle_path: Option<String>,
    /// The response deadline passed before `wait_for_status` was reached;
    /// `status` is the best known so far.
    pub timed_out: bool,
    pub stored_at: Option<u64>,
    pub announced_at: Option<u64>,
    pub mined_at: Option<u64>,
}

impl TransactionStatusReply {
    fn from_record(record: &TransactionRecord, merkle_path: Option<String>) -> Self {
        Self {
            txid: record.hash.to_string(),
            status: record.status,
            block_hash: record.block_hash,
            block_height: record.block_height,
            reject_reason: record.reject_reason.clone(),
            merkle_path,
            timed_out: false,
            stored_at: record.stored_at,
            announced_at: record.announced_at,
            mined_at: record.mined_at,
        }
    }
}

/// Aggregate health of one Metamorph instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReply {
    pub ok: bool,
    pub timestamp: u64,
    pub uptime_secs: u64,
    pub received: u64,
    pub processed: u64,
    pub waiting: u64,
    pub peers_connected: String,
    pub peers_disconnected: String,
}

/// Carries a submission to the instance that owns its fingerprint.
///
/// The production transport (gRPC, like the rest of the external surface)
/// lives with the embedding binary; tests use an in-process registry.
#[async_trait]
pub trait TransactionForwarder: Send + Sync {
    async fn put_transaction(
        &self,
        owner: &str,
        request: TransactionRequest,
    ) -> Result<TransactionStatusReply, MetamorphError>;
}

/// The Metamorph service boundary.
pub struct Server<B> {
    store: Arc<dyn MetamorphStore>,
    processor: Arc<Processor<B>>,
    blocktx: B,
    /// This instance's identity for owner routing.
    source: String,
    timeout: Duration,
    forwarder: Option<Arc<dyn TransactionForwarder>>,
}

impl<B> Server<B>
where
    B: BlockTxClient,
    B::Future: Send,
{
    pub fn new(
        store: Arc<dyn MetamorphStore>,
        processor: Arc<Processor<B>>,
        blocktx: B,
        source: &str,
    ) -> Self {
        Self {
            store,
            processor,
            blocktx,
            source: source.to_string(),
            timeout: RESPONSE_TIMEOUT,
            forwarder: None,
        }
    }

    /// Overrides the response deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables owner routing through `forwarder`.
    #[must_use]
    pub fn with_forwarder(mut self, forwarder: Arc<dyn TransactionForwarder>) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    /// Submits a transaction and waits (bounded) for the requested status.
    pub async fn put_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<TransactionStatusReply, MetamorphError> {
        validate_callback_url(request.callback_url.as_deref())?;

        let hash = ChainHash::double_sha256(&request.raw_tx);
        let registered =
            blocktx_client::register_transaction(&self.blocktx, hash, &self.source).await?;

        if registered.source != self.source {
            if request.forwarded {
                warn!(%hash, owner = %registered.source, "endless forwarding loop detected");
                return Err(MetamorphError::ForwardingLoop(hash));
            }
            let Some(forwarder) = &self.forwarder else {
                return Err(MetamorphError::Unavailable(registered.source));
            };

            debug!(%hash, owner = %registered.source, "forwarding to owning instance");
            let mut forwarded = request;
            forwarded.forwarded = true;
            let mut reply = forwarder
                .put_transaction(&registered.source, forwarded)
                .await?;
            reply.merkle_path = registered.merkle_path;
            return Ok(reply);
        }

        if let Some(block_hash) = registered.block_hash {
            // Mined outside of us before submission: create the record so
            // the association has somewhere to land.
            info!(%hash, block = %block_hash, "transaction already mined at submission");
            let mut record = TransactionRecord::new(request.raw_tx.clone());
            record.callback_url = request.callback_url.clone();
            record.callback_token = request.callback_token.clone();
            record.stored_at = Some(current_unix_timestamp());
            record.locked_by = self.source.clone();
            if let Err(err) = self.store.set(record).await {
                error!(%hash, %err, "failed to store pre-mined transaction");
            }
            self.store
                .update_mined(&hash, &block_hash, registered.block_height)
                .await?;
        }

        match self.store.get(&hash).await {
            Ok(existing) => {
                return Ok(TransactionStatusReply::from_record(
                    &existing,
                    registered.merkle_path,
                ));
            }
            Err(StoreError::NotFound) => {}
            // A read failure must not fail the submission; the write path
            // below is the one that matters.
            Err(err) => warn!(%hash, %err, "store read failed during submission"),
        }

        let mut record = TransactionRecord::new(request.raw_tx);
        record.callback_url = request.callback_url;
        record.callback_token = request.callback_token;

        let wait_for = match request.wait_for_status {
            None | Some(TransactionStatus::Unknown) => TransactionStatus::SeenOnNetwork,
            Some(status) => status,
        };

        let (waiter_tx, mut waiter_rx) = mpsc::channel(WAITER_CHANNEL_CAPACITY);
        self.processor
            .process_transaction(ProcessorRequest {
                record,
                response_channel: Some(waiter_tx),
            })
            .await;

        let mut reply = TransactionStatusReply {
            txid: hash.to_string(),
            ..TransactionStatusReply::default()
        };
        let mut deadline = pin!(sleep(self.timeout));

        loop {
            tokio::select! {
                () = &mut deadline => {
                    reply.timed_out = true;
                    return Ok(reply);
                }
                update = waiter_rx.recv() => match update {
                    Some(update) => {
                        reply.status = update.status;
                        reply.reject_reason = update.err;
                        if update.status.reached(wait_for) {
                            return Ok(reply);
                        }
                    }
                    // Entry evicted; nothing more will arrive.
                    None => return Ok(reply),
                },
            }
        }
    }

    /// Submits a batch concurrently; replies come back in input order.
    pub async fn put_transactions(
        &self,
        requests: Vec<TransactionRequest>,
    ) -> Result<Vec<TransactionStatusReply>, MetamorphError> {
        let replies =
            futures::future::join_all(requests.into_iter().map(|r| self.put_transaction(r))).await;
        replies.into_iter().collect()
    }

    /// The full stored record for a transaction.
    pub async fn get_transaction(&self, txid: &str) -> Result<TransactionRecord, MetamorphError> {
        let hash = parse_txid(txid)?;
        match self.store.get(&hash).await {
            Ok(record) => Ok(record),
            Err(StoreError::NotFound) => Err(MetamorphError::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    /// The status record, with the Merkle path fetched lazily from
    /// BlockTx.
    pub async fn get_transaction_status(
        &self,
        txid: &str,
    ) -> Result<TransactionStatusReply, MetamorphError> {
        let hash = parse_txid(txid)?;
        let record = match self.store.get(&hash).await {
            Ok(record) => record,
            Err(StoreError::NotFound) => return Err(MetamorphError::NotFound),
            Err(err) => return Err(err.into()),
        };

        let merkle_path = match blocktx_client::merkle_path(&self.blocktx, hash).await {
            Ok(path) => {
                if path.is_none() && record.status == TransactionStatus::Mined {
                    error!(%hash, "merkle path missing for mined transaction");
                }
                path
            }
            Err(err) => {
                warn!(%hash, %err, "failed to fetch merkle path");
                None
            }
        };

        Ok(TransactionStatusReply::from_record(&record, merkle_path))
    }

    /// Operational recovery: release every record lock held by `name`.
    pub async fn set_unlocked_by_name(&self, name: &str) -> Result<u64, MetamorphError> {
        Ok(self.store.set_unlocked_by_name(name).await?)
    }

    pub async fn health(&self) -> HealthReply {
        let (connected, disconnected) = self.processor.peers();
        let stats = self.processor.stats();
        HealthReply {
            ok: true,
            timestamp: current_unix_timestamp(),
            uptime_secs: stats.uptime_secs(),
            received: crate::stats::ProcessorStats::get(&stats.received),
            processed: crate::stats::ProcessorStats::get(&stats.sent),
            waiting: self.processor.in_flight() as u64,
            peers_connected: connected.join(","),
            peers_disconnected: disconnected.join(","),
        }
    }

    /// Stops the processor; in-flight records are unlocked for takeover.
    pub async fn shutdown(&self) {
        info!("shutting down");
        self.processor.shutdown().await;
    }
}

fn parse_txid(txid: &str) -> Result<ChainHash, MetamorphError> {
    ChainHash::from_display_str(txid)
        .map_err(|err| MetamorphError::InvalidArgument(format!("txid: {err}")))
}

fn validate_callback_url(url: Option<&str>) -> Result<(), MetamorphError> {
    let Some(url) = url else {
        return Ok(());
    };
    reqwest::Url::parse(url)
        .map_err(|err| MetamorphError::InvalidArgument(format!("callback url: {err}")))?;
    Ok(())
}
