//! Callback delivery tests against a scripted HTTP endpoint.

mod common;

use std::{sync::Arc, time::Duration};

use tokio::time::timeout;

use arc_blocktx::store::{BlockTxStore, InMemoryBlockTxStore};
use arc_metamorph::Callbacker;
use arc_types::{BlockRecord, ChainHash, TransactionRecord, TransactionStatus};

use common::{callback_server, instance};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn mined_record(url: &str, token: Option<&str>) -> TransactionRecord {
    let mut record = TransactionRecord::new(b"raw tx".to_vec());
    record.status = TransactionStatus::Mined;
    record.block_hash = Some(ChainHash::double_sha256(b"block"));
    record.block_height = 822_014;
    record.callback_url = Some(url.to_string());
    record.callback_token = token.map(String::from);
    record
}

#[tokio::test]
async fn delivers_status_with_bearer_token() {
    let (url, mut seen) = callback_server(vec![200]).await;
    let record = mined_record(&url, Some("secret-token"));

    Callbacker::new()
        .with_retry(5, Duration::from_millis(10))
        .send_callback(&record)
        .await;

    let request = timeout(TEST_TIMEOUT, seen.recv()).await.unwrap().unwrap();
    assert!(request.headers.contains("authorization: Bearer secret-token")
        || request.headers.contains("Authorization: Bearer secret-token"));

    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(body["txid"], record.hash.to_string());
    assert_eq!(body["txStatus"], "MINED");
    assert_eq!(body["blockHeight"], 822_014);
    assert_eq!(
        body["blockHash"],
        ChainHash::double_sha256(b"block").to_string(),
    );
    assert!(body["timestamp"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn retries_until_the_endpoint_accepts() {
    let (url, mut seen) = callback_server(vec![500, 200]).await;
    let record = mined_record(&url, None);

    Callbacker::new()
        .with_retry(5, Duration::from_millis(10))
        .send_callback(&record)
        .await;

    // Both the failed and the successful attempt hit the endpoint.
    timeout(TEST_TIMEOUT, seen.recv()).await.unwrap().unwrap();
    timeout(TEST_TIMEOUT, seen.recv()).await.unwrap().unwrap();
    assert!(seen.try_recv().is_err());
}

#[tokio::test]
async fn gives_up_after_the_attempts_run_out() {
    let (url, mut seen) = callback_server(vec![500, 500, 500]).await;
    let record = mined_record(&url, None);

    Callbacker::new()
        .with_retry(3, Duration::from_millis(10))
        .send_callback(&record)
        .await;

    for _ in 0..3 {
        timeout(TEST_TIMEOUT, seen.recv()).await.unwrap().unwrap();
    }
    // No fourth attempt.
    assert!(seen.try_recv().is_err());
}

#[tokio::test]
async fn mined_reconciliation_fires_the_callback() {
    // Two notifications can arrive: one for SEEN_ON_NETWORK, the final one
    // for MINED.
    let (url, mut seen) = callback_server(vec![200, 200]).await;

    let blocktx = Arc::new(InMemoryBlockTxStore::new());
    let instance = instance("host-a", &blocktx);

    let raw = b"raw tx".to_vec();
    let hash = ChainHash::double_sha256(&raw);
    let mut record = TransactionRecord::new(raw);
    record.callback_url = Some(url.clone());
    instance
        .processor
        .process_transaction(arc_metamorph::ProcessorRequest {
            record,
            response_channel: None,
        })
        .await;
    instance
        .processor
        .send_status_for_transaction(&hash, TransactionStatus::SeenOnNetwork, "peer", None)
        .await
        .unwrap();

    let block_hash = ChainHash::double_sha256(b"mined block");
    let id = blocktx
        .insert_block(&BlockRecord {
            id: 0,
            hash: block_hash,
            prev_hash: ChainHash::double_sha256(b"prev"),
            merkle_root: hash,
            height: 900_001,
            processed_at: None,
            size: 216,
            tx_count: 1,
        })
        .await
        .unwrap();
    blocktx
        .update_block_transactions(id, &[hash], &["00".to_string()])
        .await
        .unwrap();
    blocktx
        .mark_block_as_done(&block_hash, 216, 1)
        .await
        .unwrap();

    instance.processor.check_if_mined().await.unwrap();

    let request = timeout(TEST_TIMEOUT, seen.recv()).await.unwrap().unwrap();
    let mut body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    if body["txStatus"] == "SEEN_ON_NETWORK" {
        let request = timeout(TEST_TIMEOUT, seen.recv()).await.unwrap().unwrap();
        body = serde_json::from_str(&request.body).unwrap();
    }
    assert_eq!(body["txid"], hash.to_string());
    assert_eq!(body["txStatus"], "MINED");
    assert_eq!(body["blockHeight"], 900_001);
}
