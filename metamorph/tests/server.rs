//! Service boundary tests: waiting, timeouts, owner forwarding.

mod common;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;

use arc_blocktx::store::InMemoryBlockTxStore;
use arc_metamorph::{
    MetamorphError, Server, TransactionForwarder, TransactionRequest, TransactionStatusReply,
};
use arc_types::{ChainHash, TransactionStatus};

use common::{instance, Instance};

/// Routes forwards to in-process servers by owner name.
#[derive(Default)]
struct LoopbackForwarder {
    servers: Mutex<HashMap<String, Arc<Server<arc_blocktx::BlockTxHandle>>>>,
}

impl LoopbackForwarder {
    fn register(&self, name: &str, server: Arc<Server<arc_blocktx::BlockTxHandle>>) {
        self.servers.lock().unwrap().insert(name.to_string(), server);
    }
}

#[async_trait]
impl TransactionForwarder for LoopbackForwarder {
    async fn put_transaction(
        &self,
        owner: &str,
        request: TransactionRequest,
    ) -> Result<TransactionStatusReply, MetamorphError> {
        let server = self
            .servers
            .lock()
            .unwrap()
            .get(owner)
            .cloned()
            .ok_or_else(|| MetamorphError::Unavailable(owner.to_string()))?;
        server.put_transaction(request).await
    }
}

fn request(raw: &[u8], wait_for: TransactionStatus) -> TransactionRequest {
    TransactionRequest {
        wait_for_status: Some(wait_for),
        ..TransactionRequest::new(raw.to_vec())
    }
}

#[tokio::test]
async fn put_transaction_returns_once_the_target_status_is_reached() {
    let blocktx = Arc::new(InMemoryBlockTxStore::new());
    let Instance {
        server, network, ..
    } = instance("host-a", &blocktx);

    let raw = b"raw tx".to_vec();
    let reply = server
        .put_transaction(request(&raw, TransactionStatus::AnnouncedToNetwork))
        .await
        .unwrap();

    assert_eq!(reply.status, TransactionStatus::AnnouncedToNetwork);
    assert!(!reply.timed_out);
    assert_eq!(reply.txid, ChainHash::double_sha256(&raw).to_string());
    assert_eq!(network.announcements.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn waiting_for_seen_times_out_with_the_best_known_status() {
    let blocktx = Arc::new(InMemoryBlockTxStore::new());
    let Instance { server, .. } = instance("host-a", &blocktx);
    let server = server.with_timeout(Duration::from_millis(100));

    // Nothing ever reports SEEN_ON_NETWORK, so the deadline fires.
    let reply = server
        .put_transaction(request(b"raw tx", TransactionStatus::SeenOnNetwork))
        .await
        .unwrap();

    assert!(reply.timed_out);
    assert_eq!(reply.status, TransactionStatus::AnnouncedToNetwork);
}

#[tokio::test]
async fn resubmission_returns_the_stored_record_without_reprocessing() {
    let blocktx = Arc::new(InMemoryBlockTxStore::new());
    let Instance {
        server, network, ..
    } = instance("host-a", &blocktx);

    let raw = b"raw tx".to_vec();
    server
        .put_transaction(request(&raw, TransactionStatus::AnnouncedToNetwork))
        .await
        .unwrap();
    let reply = server
        .put_transaction(request(&raw, TransactionStatus::SeenOnNetwork))
        .await
        .unwrap();

    assert_eq!(reply.status, TransactionStatus::AnnouncedToNetwork);
    assert!(!reply.timed_out);
    // Still only the original announcement.
    assert_eq!(network.announcements.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_submissions_forward_to_the_owner() {
    // One shared BlockTx; two Metamorph instances.
    let blocktx = Arc::new(InMemoryBlockTxStore::new());
    let a = instance("host-a", &blocktx);
    let b = instance("host-b", &blocktx);

    let forwarder = Arc::new(LoopbackForwarder::default());
    let server_a = Arc::new(a.server.with_forwarder(forwarder.clone()));
    let server_b = Arc::new(b.server.with_forwarder(forwarder.clone()));
    forwarder.register("host-a", Arc::clone(&server_a));
    forwarder.register("host-b", Arc::clone(&server_b));

    let raw = b"raw tx".to_vec();
    let hash = ChainHash::double_sha256(&raw);

    let reply_a = server_a
        .put_transaction(request(&raw, TransactionStatus::AnnouncedToNetwork))
        .await
        .unwrap();
    assert_eq!(reply_a.status, TransactionStatus::AnnouncedToNetwork);

    // The same raw bytes hit the other instance; it must route to host-a
    // instead of processing.
    let reply_b = server_b
        .put_transaction(request(&raw, TransactionStatus::AnnouncedToNetwork))
        .await
        .unwrap();
    assert_eq!(reply_b.txid, hash.to_string());
    assert_eq!(reply_b.status, TransactionStatus::AnnouncedToNetwork);

    // Exactly one announcement across the fleet.
    assert_eq!(a.network.announcements.lock().unwrap().len(), 1);
    assert!(b.network.announcements.lock().unwrap().is_empty());
    // And only the owner holds it in memory.
    assert!(a.processor.is_tracked(&hash));
    assert!(!b.processor.is_tracked(&hash));
}

#[tokio::test]
async fn forwarded_requests_are_never_forwarded_again() {
    let blocktx = Arc::new(InMemoryBlockTxStore::new());
    let a = instance("host-a", &blocktx);
    let b = instance("host-b", &blocktx);

    let raw = b"raw tx".to_vec();
    a.server
        .put_transaction(request(&raw, TransactionStatus::AnnouncedToNetwork))
        .await
        .unwrap();

    // host-b is not the owner, and the request claims to be forwarded
    // already: the loop breaker must fire rather than bounce it onward.
    let mut forwarded = request(&raw, TransactionStatus::AnnouncedToNetwork);
    forwarded.forwarded = true;
    let err = b.server.put_transaction(forwarded).await.unwrap_err();
    assert!(matches!(err, MetamorphError::ForwardingLoop(_)));
}

#[tokio::test]
async fn batch_submissions_answer_in_input_order() {
    let blocktx = Arc::new(InMemoryBlockTxStore::new());
    let Instance { server, .. } = instance("host-a", &blocktx);

    let raws: Vec<Vec<u8>> = (0u8..5).map(|i| vec![i; 8]).collect();
    let requests: Vec<TransactionRequest> = raws
        .iter()
        .map(|raw| request(raw, TransactionStatus::AnnouncedToNetwork))
        .collect();

    let replies = server.put_transactions(requests).await.unwrap();

    assert_eq!(replies.len(), raws.len());
    for (raw, reply) in raws.iter().zip(&replies) {
        assert_eq!(reply.txid, ChainHash::double_sha256(raw).to_string());
        assert_eq!(reply.status, TransactionStatus::AnnouncedToNetwork);
    }
}

#[tokio::test]
async fn get_transaction_status_includes_the_merkle_path_once_mined() {
    let blocktx = Arc::new(InMemoryBlockTxStore::new());
    let Instance {
        server, processor, ..
    } = instance("host-a", &blocktx);

    let raw = b"raw tx".to_vec();
    let hash = ChainHash::double_sha256(&raw);
    server
        .put_transaction(request(&raw, TransactionStatus::AnnouncedToNetwork))
        .await
        .unwrap();

    // Not mined yet: no merkle path.
    let status = server.get_transaction_status(&hash.to_string()).await.unwrap();
    assert_eq!(status.status, TransactionStatus::AnnouncedToNetwork);
    assert!(status.merkle_path.is_none());

    // Mine it through BlockTx and reconcile.
    use arc_blocktx::store::BlockTxStore;
    let block_hash = ChainHash::double_sha256(b"block");
    let id = blocktx
        .insert_block(&arc_types::BlockRecord {
            id: 0,
            hash: block_hash,
            prev_hash: ChainHash::double_sha256(b"prev"),
            merkle_root: hash,
            height: 850_000,
            processed_at: None,
            size: 216,
            tx_count: 1,
        })
        .await
        .unwrap();
    blocktx
        .update_block_transactions(id, &[hash], &["fe12031800".to_string()])
        .await
        .unwrap();
    blocktx.mark_block_as_done(&block_hash, 216, 1).await.unwrap();
    processor.check_if_mined().await.unwrap();

    let status = server.get_transaction_status(&hash.to_string()).await.unwrap();
    assert_eq!(status.status, TransactionStatus::Mined);
    assert_eq!(status.block_hash, Some(block_hash));
    assert_eq!(status.block_height, 850_000);
    assert_eq!(status.merkle_path.as_deref(), Some("fe12031800"));
}

#[tokio::test]
async fn unknown_transactions_and_bad_txids_error() {
    let blocktx = Arc::new(InMemoryBlockTxStore::new());
    let Instance { server, .. } = instance("host-a", &blocktx);

    let missing = ChainHash::double_sha256(b"missing").to_string();
    assert!(matches!(
        server.get_transaction(&missing).await.unwrap_err(),
        MetamorphError::NotFound,
    ));
    assert!(matches!(
        server.get_transaction_status("not-hex").await.unwrap_err(),
        MetamorphError::InvalidArgument(_),
    ));
}

#[tokio::test]
async fn invalid_callback_urls_are_refused() {
    let blocktx = Arc::new(InMemoryBlockTxStore::new());
    let Instance { server, .. } = instance("host-a", &blocktx);

    let mut bad = request(b"raw tx", TransactionStatus::AnnouncedToNetwork);
    bad.callback_url = Some("not a url".to_string());

    assert!(matches!(
        server.put_transaction(bad).await.unwrap_err(),
        MetamorphError::InvalidArgument(_),
    ));
}

#[tokio::test]
async fn set_unlocked_by_name_reports_the_affected_count() {
    let blocktx = Arc::new(InMemoryBlockTxStore::new());
    let Instance { server, .. } = instance("host-a", &blocktx);

    server
        .put_transaction(request(b"one", TransactionStatus::AnnouncedToNetwork))
        .await
        .unwrap();
    server
        .put_transaction(request(b"two", TransactionStatus::AnnouncedToNetwork))
        .await
        .unwrap();

    assert_eq!(server.set_unlocked_by_name("host-a").await.unwrap(), 2);
    assert_eq!(server.set_unlocked_by_name("host-a").await.unwrap(), 0);
}

#[tokio::test]
async fn health_reports_peers_and_in_flight_counts() {
    let blocktx = Arc::new(InMemoryBlockTxStore::new());
    let Instance { server, .. } = instance("host-a", &blocktx);

    server
        .put_transaction(request(b"raw tx", TransactionStatus::AnnouncedToNetwork))
        .await
        .unwrap();

    let health = server.health().await;
    assert!(health.ok);
    assert_eq!(health.waiting, 1);
    assert_eq!(health.received, 1);
    assert_eq!(health.peers_connected, "127.0.0.1:18333,127.0.0.1:18334");
    assert_eq!(health.peers_disconnected, "");
}
