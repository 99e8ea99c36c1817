//! The peer pool.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::seq::IteratorRandom;
use tokio::{
    sync::mpsc,
    time::{sleep_until, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument, Span};

use arc_types::ChainHash;
use arc_wire::{InvVect, Message, Network};

use crate::{
    constants::{HEALTHY_PEER_FLOOR, INV_BATCH_AGE, INV_BATCH_SIZE},
    NetworkPeer, Peer, PeerHandler, PeerNetwork,
};

/// Owns every [`Peer`] and fans announcements out across them.
///
/// Transaction announcements are not sent one by one: they collect into a
/// batch that is flushed as one INV either when it reaches
/// [`INV_BATCH_SIZE`] entries or when the batch has been open for
/// [`INV_BATCH_AGE`], whichever comes first.
pub struct PeerManager {
    peers: DashMap<String, Peer>,
    network: Network,
    inv_tx: mpsc::UnboundedSender<ChainHash>,
    shutdown: CancellationToken,
}

impl PeerManager {
    /// Creates the manager and its INV batching task.
    pub fn new(network: Network) -> Arc<Self> {
        Self::with_batching(network, INV_BATCH_SIZE, INV_BATCH_AGE)
    }

    /// As [`PeerManager::new`] with explicit batching parameters.
    pub fn with_batching(network: Network, batch_size: usize, batch_age: Duration) -> Arc<Self> {
        let (inv_tx, inv_rx) = mpsc::unbounded_channel();

        let manager = Arc::new(Self {
            peers: DashMap::new(),
            network,
            inv_tx,
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(
            inv_batcher(Arc::clone(&manager), inv_rx, batch_size, batch_age)
                .instrument(Span::current()),
        );

        manager
    }

    /// Dials a new peer and adds it to the pool.
    ///
    /// Re-adding an address replaces (and shuts down) the previous peer.
    pub fn add_peer(&self, address: &str, handler: Arc<dyn PeerHandler>) {
        let peer = Peer::new(address, self.network, handler);
        if let Some(previous) = self.peers.insert(address.to_string(), peer) {
            previous.shutdown();
        }
    }

    /// The number of currently connected peers.
    pub fn connected_count(&self) -> usize {
        self.peers.iter().filter(|p| p.connected()).count()
    }

    /// Stops the batcher and disconnects every peer.
    pub fn shutdown(&self) {
        info!("shutting down peer manager");
        self.shutdown.cancel();
        for peer in self.peers.iter() {
            peer.shutdown();
        }
        self.peers.clear();
    }

    fn flush_inv(&self, batch: &mut Vec<ChainHash>) {
        if batch.is_empty() {
            return;
        }
        let items = batch.len();
        let message = Message::Inv(batch.drain(..).map(InvVect::tx).collect());

        let mut sent = 0;
        for peer in self.peers.iter() {
            match peer.write_message(message.clone()) {
                Ok(()) => sent += 1,
                Err(err) => debug!(addr = peer.address(), %err, "inv not sent"),
            }
        }
        info!(items, peers = sent, "sent inv batch");
    }
}

/// Collects queued announcements and flushes them by size or age.
async fn inv_batcher(
    manager: Arc<PeerManager>,
    mut inv_rx: mpsc::UnboundedReceiver<ChainHash>,
    batch_size: usize,
    batch_age: Duration,
) {
    let mut batch: Vec<ChainHash> = Vec::new();
    let mut deadline = Instant::now();

    loop {
        tokio::select! {
            () = manager.shutdown.cancelled() => break,
            received = inv_rx.recv() => match received {
                Some(hash) => {
                    if batch.is_empty() {
                        deadline = Instant::now() + batch_age;
                    }
                    batch.push(hash);
                    if batch.len() >= batch_size {
                        manager.flush_inv(&mut batch);
                    }
                }
                None => break,
            },
            () = sleep_until(deadline), if !batch.is_empty() => {
                manager.flush_inv(&mut batch);
            }
        }
    }

    manager.flush_inv(&mut batch);
}

impl PeerNetwork for PeerManager {
    fn announce_transaction(&self, hash: ChainHash) {
        // Only fails after shutdown, when nobody is listening anyway.
        let _ = self.inv_tx.send(hash);
    }

    fn announce_block(&self, hash: ChainHash) {
        let message = Message::Inv(vec![InvVect::block(hash)]);
        for peer in self.peers.iter() {
            if let Err(err) = peer.write_message(message.clone()) {
                debug!(addr = peer.address(), %err, "block inv not sent");
            }
        }
    }

    fn request_transaction(&self, hash: ChainHash) -> bool {
        let Some(peer) = self.peers.iter().find(|p| p.connected()) else {
            return false;
        };
        peer.request_transaction(hash);
        true
    }

    fn request_block(&self, hash: ChainHash) -> bool {
        let connected: Vec<_> = self
            .peers
            .iter()
            .filter(|p| p.connected())
            .map(|p| p.value().clone())
            .collect();
        let Some(peer) = connected.iter().choose(&mut rand::thread_rng()) else {
            return false;
        };
        peer.request_block(hash);
        true
    }

    fn get_peers(&self) -> (Vec<String>, Vec<String>) {
        let mut connected = Vec::new();
        let mut disconnected = Vec::new();
        for peer in self.peers.iter() {
            if peer.connected() {
                connected.push(peer.key().clone());
            } else {
                disconnected.push(peer.key().clone());
            }
        }
        (connected, disconnected)
    }

    fn is_healthy(&self) -> bool {
        self.connected_count() >= HEALTHY_PEER_FLOOR
    }
}
