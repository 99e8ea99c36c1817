//! # ARC p2p
//!
//! Long-lived peer connections for the ARC services.
//!
//! A [`Peer`] is one supervised connection to a remote node: it dials,
//! performs the VERSION/VERACK handshake, keeps the connection alive with
//! periodic pings and re-dials with a fixed backoff whenever the socket
//! drops. Inbound traffic is dispatched to a [`PeerHandler`]; outbound
//! messages go through a bounded queue drained by a dedicated writer task.
//!
//! The [`PeerManager`] owns a set of peers, batches transaction INV
//! announcements across the fleet and answers health queries. Services hold
//! the manager behind the [`PeerNetwork`] trait so tests can stand in a
//! fake network.

mod error;
mod manager;
mod peer;

pub mod constants;

use async_trait::async_trait;

use arc_types::ChainHash;
use arc_wire::{BlockMessage, Message, Reject};

pub use error::PeerError;
pub use manager::PeerManager;
pub use peer::Peer;

/// A boxed error returned by handler callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Inbound peer events, dispatched by the read loop.
///
/// Handler errors are logged by the peer and never tear the connection
/// down; a misbehaving message must not cost us the peer.
#[async_trait]
pub trait PeerHandler: Send + Sync + 'static {
    /// The peer advertised a transaction (INV).
    async fn transaction_announced(
        &self,
        hash: ChainHash,
        peer: &dyn NetworkPeer,
    ) -> Result<(), BoxError>;

    /// The peer advertised a block (INV).
    async fn block_announced(&self, hash: ChainHash, peer: &dyn NetworkPeer)
        -> Result<(), BoxError>;

    /// The peer asked for a transaction's raw bytes (GETDATA).
    ///
    /// Returning `Ok(None)` means we don't have it; nothing is sent back.
    async fn transaction_requested(&self, hash: ChainHash) -> Result<Option<Vec<u8>>, BoxError>;

    /// A TX message for `hash` was written onto the socket.
    async fn transaction_sent(&self, hash: ChainHash) -> Result<(), BoxError>;

    /// The peer rejected something we relayed.
    async fn transaction_rejected(
        &self,
        reject: Reject,
        peer: &dyn NetworkPeer,
    ) -> Result<(), BoxError>;

    /// A full block arrived.
    async fn block_received(
        &self,
        block: BlockMessage,
        peer: &dyn NetworkPeer,
    ) -> Result<(), BoxError>;
}

/// One remote node, as seen by handlers and services.
pub trait NetworkPeer: Send + Sync {
    /// The `host:port` this peer dials.
    fn address(&self) -> &str;

    /// Connected and fully through the handshake.
    fn connected(&self) -> bool;

    fn is_healthy(&self) -> bool;

    /// Queues a message onto the bounded outbound buffer.
    ///
    /// Fails when the peer is not [`connected`](Self::connected) or the
    /// buffer is full.
    fn write_message(&self, message: Message) -> Result<(), PeerError>;

    /// Advertises a transaction to this peer only.
    fn announce_transaction(&self, hash: ChainHash);

    /// Asks this peer for a transaction's raw bytes.
    fn request_transaction(&self, hash: ChainHash);

    /// Advertises a block to this peer only.
    fn announce_block(&self, hash: ChainHash);

    /// Asks this peer for a full block.
    fn request_block(&self, hash: ChainHash);
}

/// The peer fleet, as seen by the services.
pub trait PeerNetwork: Send + Sync {
    /// Queues a transaction for the next batched INV broadcast.
    fn announce_transaction(&self, hash: ChainHash);

    /// Broadcasts a block INV to every peer immediately.
    fn announce_block(&self, hash: ChainHash);

    /// Asks a single connected peer for a transaction.
    ///
    /// Returns `false` if no peer is connected.
    fn request_transaction(&self, hash: ChainHash) -> bool;

    /// Asks a random connected peer for a block.
    ///
    /// Returns `false` if no peer is connected.
    fn request_block(&self, hash: ChainHash) -> bool;

    /// The addresses of (connected, disconnected) peers.
    fn get_peers(&self) -> (Vec<String>, Vec<String>);

    /// `true` iff enough peers are connected to trust the network view.
    fn is_healthy(&self) -> bool;
}
