//! Shared fixtures for the integration tests.
//!
//! Not every test binary uses every fixture.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::mpsc,
};

use arc_blocktx::{store::InMemoryBlockTxStore, BlockTxHandle};
use arc_metamorph::{
    store::{InMemoryMetamorphStore, MetamorphStore},
    Callbacker, MetamorphConfig, Processor, ProcessorStats, Server,
};
use arc_p2p::PeerNetwork;
use arc_types::ChainHash;

/// A peer fleet that records announcements instead of sending them.
#[derive(Default)]
pub struct FakeNetwork {
    pub announcements: Mutex<Vec<ChainHash>>,
}

impl PeerNetwork for FakeNetwork {
    fn announce_transaction(&self, hash: ChainHash) {
        self.announcements.lock().unwrap().push(hash);
    }
    fn announce_block(&self, _hash: ChainHash) {}
    fn request_transaction(&self, _hash: ChainHash) -> bool {
        true
    }
    fn request_block(&self, _hash: ChainHash) -> bool {
        true
    }
    fn get_peers(&self) -> (Vec<String>, Vec<String>) {
        (
            vec!["127.0.0.1:18333".to_string(), "127.0.0.1:18334".to_string()],
            vec![],
        )
    }
    fn is_healthy(&self) -> bool {
        true
    }
}

/// One Metamorph instance wired to a shared BlockTx store.
pub struct Instance {
    pub store: Arc<InMemoryMetamorphStore>,
    pub network: Arc<FakeNetwork>,
    pub processor: Arc<Processor<BlockTxHandle>>,
    pub server: Server<BlockTxHandle>,
}

pub fn config(host_name: &str) -> MetamorphConfig {
    MetamorphConfig {
        host_name: host_name.to_string(),
        ..MetamorphConfig::default()
    }
}

pub fn instance(host_name: &str, blocktx_store: &Arc<InMemoryBlockTxStore>) -> Instance {
    instance_with_config(blocktx_store, &config(host_name))
}

pub fn instance_with_config(
    blocktx_store: &Arc<InMemoryBlockTxStore>,
    config: &MetamorphConfig,
) -> Instance {
    let store = Arc::new(InMemoryMetamorphStore::new());
    let network = Arc::new(FakeNetwork::default());
    let blocktx = BlockTxHandle::new(Arc::clone(blocktx_store) as _);

    let processor = Processor::new(
        Arc::clone(&store) as Arc<dyn MetamorphStore>,
        Arc::clone(&network) as Arc<dyn PeerNetwork>,
        blocktx.clone(),
        Callbacker::new(),
        Arc::new(ProcessorStats::new()),
        config,
    );
    let server = Server::new(
        Arc::clone(&store) as Arc<dyn MetamorphStore>,
        Arc::clone(&processor),
        blocktx,
        &config.host_name,
    );

    Instance {
        store,
        network,
        processor,
        server,
    }
}

/// A single remote peer that goes nowhere.
pub struct FakePeer;

impl arc_p2p::NetworkPeer for FakePeer {
    fn address(&self) -> &str {
        "127.0.0.1:18333"
    }
    fn connected(&self) -> bool {
        true
    }
    fn is_healthy(&self) -> bool {
        true
    }
    fn write_message(&self, _message: arc_wire::Message) -> Result<(), arc_p2p::PeerError> {
        Ok(())
    }
    fn announce_transaction(&self, _hash: ChainHash) {}
    fn request_transaction(&self, _hash: ChainHash) {}
    fn announce_block(&self, _hash: ChainHash) {}
    fn request_block(&self, _hash: ChainHash) {}
}

/// A received callback request.
pub struct CallbackRequest {
    pub headers: String,
    pub body: String,
}

/// A one-shot HTTP server answering each request with the next status in
/// `responses`.
pub async fn callback_server(
    responses: Vec<u16>,
) -> (String, mpsc::UnboundedReceiver<CallbackRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/callback", listener.local_addr().unwrap());
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for status in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };

            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            let (headers, mut body) = loop {
                let n = socket.read(&mut buf).await.unwrap_or(0);
                if n == 0 {
                    return;
                }
                raw.extend_from_slice(&buf[..n]);
                if let Some(end) = find_header_end(&raw) {
                    let headers = String::from_utf8_lossy(&raw[..end]).into_owned();
                    let body = raw[end + 4..].to_vec();
                    break (headers, body);
                }
            };

            let content_length = headers
                .lines()
                .find_map(|line| line.to_ascii_lowercase().strip_prefix("content-length:").map(str::trim).map(String::from))
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0);
            while body.len() < content_length {
                let n = socket.read(&mut buf).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                body.extend_from_slice(&buf[..n]);
            }

            let _ = seen_tx.send(CallbackRequest {
                headers,
                body: String::from_utf8_lossy(&body).into_owned(),
            });

            let reason = if status == 200 { "OK" } else { "Error" };
            let response =
                format!("HTTP/1.1 {status} {reason}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            let _ = socket.write_all(response.as_bytes()).await;
        }
    });

    (url, seen_rx)
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n")
}
