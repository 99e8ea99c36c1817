//! One supervised connection to a remote node.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, RwLock,
};

use futures::{SinkExt, StreamExt};
use tokio::{
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::mpsc,
    time::{interval, sleep, timeout, MissedTickBehavior},
};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};
use tracing::{debug, info, info_span, trace, warn, Instrument};

use arc_helper::time::current_unix_timestamp;
use arc_types::ChainHash;
use arc_wire::{BlockMessage, InvKind, InvVect, Message, MessageCodec, Network, Version};

use crate::{
    constants::{
        HANDSHAKE_POLL_INTERVAL, HANDSHAKE_TIMEOUT, PING_INTERVAL, RECONNECT_INTERVAL,
        WRITE_QUEUE_CAPACITY,
    },
    NetworkPeer, PeerError, PeerHandler,
};

type MessageSink = FramedWrite<OwnedWriteHalf, MessageCodec>;
type MessageStream = FramedRead<OwnedReadHalf, MessageCodec>;

/// A peer connection that keeps itself alive.
///
/// Construction spawns a supervisor that dials, hands the socket halves to
/// a reader and a writer task, and re-enters dialing with a fixed backoff
/// whenever the connection is lost. Cloning is cheap and shares the
/// underlying connection.
#[derive(Clone)]
pub struct Peer {
    inner: Arc<PeerInner>,
}

struct PeerInner {
    address: String,
    network: Network,
    handler: Arc<dyn PeerHandler>,
    /// Sender into the current connection's outbound queue, if any.
    writer: RwLock<Option<mpsc::Sender<Message>>>,
    /// A read loop is currently running.
    read_active: AtomicBool,
    /// We replied VERACK to the peer's VERSION.
    sent_verack: AtomicBool,
    /// The peer acknowledged our VERSION.
    received_verack: AtomicBool,
    /// Bumped on every dial so stale connection tasks can tell they lost.
    generation: AtomicU64,
    shutdown: CancellationToken,
}

impl Peer {
    /// Creates the peer and starts its supervisor and pinger tasks.
    ///
    /// The first dial happens immediately; the peer is usable once
    /// [`connected`](NetworkPeer::connected) turns true.
    pub fn new(address: &str, network: Network, handler: Arc<dyn PeerHandler>) -> Self {
        let peer = Self {
            inner: Arc::new(PeerInner {
                address: address.to_string(),
                network,
                handler,
                writer: RwLock::new(None),
                read_active: AtomicBool::new(false),
                sent_verack: AtomicBool::new(false),
                received_verack: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
            }),
        };

        let span = info_span!("peer", addr = %peer.inner.address);
        tokio::spawn(supervisor(peer.clone()).instrument(span.clone()));
        tokio::spawn(pinger(peer.clone()).instrument(span));

        peer
    }

    /// Stops the supervisor and closes the connection.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    fn handshake_complete(&self) -> bool {
        self.inner.sent_verack.load(Ordering::Acquire)
            && self.inner.received_verack.load(Ordering::Acquire)
    }

    fn socket_active(&self) -> bool {
        self.inner.read_active.load(Ordering::Acquire)
    }

    /// Clears connection state, but only if `generation` still owns it.
    fn mark_disconnected(&self, generation: u64) {
        if self.inner.generation.load(Ordering::Acquire) != generation {
            return;
        }
        self.inner.read_active.store(false, Ordering::Release);
        self.inner.sent_verack.store(false, Ordering::Release);
        self.inner.received_verack.store(false, Ordering::Release);
        *self.inner.writer.write().unwrap() = None;
    }

    async fn connect(&self) -> Result<(), PeerError> {
        let inner = &self.inner;
        let generation = inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        inner.sent_verack.store(false, Ordering::Release);
        inner.received_verack.store(false, Ordering::Release);

        info!(network = %inner.network, "connecting to peer");
        let socket = TcpStream::connect(&inner.address).await?;
        let peer_addr = socket.peer_addr()?;
        let (read_half, write_half) = socket.into_split();

        let mut sink: MessageSink = FramedWrite::new(write_half, MessageCodec::new(inner.network));
        let stream: MessageStream = FramedRead::new(read_half, MessageCodec::new(inner.network));

        // The VERSION goes out before the writer task takes the sink; the
        // outbound queue only carries post-handshake traffic and replies.
        let version = Version::outbound(
            peer_addr,
            rand::random(),
            current_unix_timestamp() as i64,
        );
        sink.send(Message::Version(version)).await?;
        debug!("sent version");

        let (conn_tx, conn_rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        let conn = inner.shutdown.child_token();

        inner.read_active.store(true, Ordering::Release);
        *inner.writer.write().unwrap() = Some(conn_tx.clone());

        tokio::spawn(read_task(
            self.clone(),
            stream,
            conn_tx,
            conn.clone(),
            generation,
        ));
        tokio::spawn(write_task(self.clone(), sink, conn_rx, conn.clone()));

        let wait_for_handshake = async {
            while !self.handshake_complete() {
                sleep(HANDSHAKE_POLL_INTERVAL).await;
            }
        };
        if timeout(HANDSHAKE_TIMEOUT, wait_for_handshake).await.is_err() {
            conn.cancel();
            self.mark_disconnected(generation);
            return Err(PeerError::HandshakeTimeout);
        }

        info!("peer connected");
        Ok(())
    }

    /// Handles one inbound message. Only queue loss is an error; handler
    /// failures are logged here and swallowed.
    async fn dispatch(
        &self,
        message: Message,
        conn_tx: &mpsc::Sender<Message>,
    ) -> Result<(), PeerError> {
        let inner = &self.inner;
        match message {
            Message::Version(_) => {
                debug!("recv version");
                conn_tx
                    .send(Message::Verack)
                    .await
                    .map_err(|_| PeerError::NotConnected)?;
                inner.sent_verack.store(true, Ordering::Release);
                debug!("sent verack");
            }
            Message::Verack => {
                debug!("recv verack");
                inner.received_verack.store(true, Ordering::Release);
            }
            Message::Ping(nonce) => {
                conn_tx
                    .send(Message::Pong(nonce))
                    .await
                    .map_err(|_| PeerError::NotConnected)?;
            }
            Message::Pong(nonce) => trace!(nonce, "recv pong"),
            Message::Inv(list) => {
                info!(items = list.len(), "recv inv");
                for inv in list {
                    let result = match inv.kind {
                        InvKind::Tx => inner.handler.transaction_announced(inv.hash, self).await,
                        InvKind::Block => inner.handler.block_announced(inv.hash, self).await,
                        InvKind::Unknown(kind) => {
                            debug!(kind, "ignoring unknown inv kind");
                            Ok(())
                        }
                    };
                    if let Err(err) = result {
                        warn!(hash = %inv.hash, %err, "inv handler failed");
                    }
                }
            }
            Message::GetData(list) => {
                info!(items = list.len(), "recv getdata");
                for inv in list {
                    match inv.kind {
                        InvKind::Tx => match inner.handler.transaction_requested(inv.hash).await {
                            Ok(Some(raw)) => {
                                conn_tx
                                    .send(Message::Tx(raw.into()))
                                    .await
                                    .map_err(|_| PeerError::NotConnected)?;
                            }
                            Ok(None) => {
                                warn!(hash = %inv.hash, "requested transaction not found");
                            }
                            Err(err) => {
                                warn!(hash = %inv.hash, %err, "failed to fetch transaction");
                            }
                        },
                        InvKind::Block => info!(hash = %inv.hash, "peer requested a block"),
                        InvKind::Unknown(kind) => debug!(kind, "ignoring unknown getdata kind"),
                    }
                }
            }
            Message::Block(raw) => match BlockMessage::parse(&raw) {
                Ok(block) => {
                    info!(hash = %block.hash, height = block.height, "recv block");
                    if let Err(err) = inner.handler.block_received(block, self).await {
                        warn!(%err, "block handler failed");
                    }
                }
                Err(err) => warn!(%err, "dropping malformed block"),
            },
            Message::Reject(reject) => {
                if let Err(err) = inner.handler.transaction_rejected(reject, self).await {
                    warn!(%err, "reject handler failed");
                }
            }
            Message::Tx(_) => debug!("ignoring unsolicited tx message"),
            Message::Unknown { command, .. } => debug!(%command, "ignored message"),
        }
        Ok(())
    }
}

/// Re-dials with a fixed backoff for as long as the peer lives.
async fn supervisor(peer: Peer) {
    loop {
        if !peer.socket_active() {
            if let Err(err) = peer.connect().await {
                warn!(%err, "failed to connect to peer");
            }
        }

        tokio::select! {
            () = peer.inner.shutdown.cancelled() => {
                let generation = peer.inner.generation.load(Ordering::Acquire);
                peer.mark_disconnected(generation);
                return;
            }
            () = sleep(RECONNECT_INTERVAL) => {}
        }
    }
}

/// Reads and dispatches inbound messages until the connection dies.
async fn read_task(
    peer: Peer,
    mut stream: MessageStream,
    conn_tx: mpsc::Sender<Message>,
    conn: CancellationToken,
    generation: u64,
) {
    loop {
        let next = tokio::select! {
            () = conn.cancelled() => break,
            next = stream.next() => next,
        };

        match next {
            None => {
                warn!("read EOF, disconnecting");
                break;
            }
            Some(Err(err)) if err.is_fatal() => {
                warn!(%err, "read failed, disconnecting");
                break;
            }
            Some(Err(err)) => {
                warn!(%err, "dropping malformed message");
            }
            Some(Ok(message)) => {
                if peer.dispatch(message, &conn_tx).await.is_err() {
                    break;
                }
            }
        }
    }

    peer.mark_disconnected(generation);
    conn.cancel();
}

/// Drains the outbound queue into the socket.
///
/// Write failures are logged and the loop keeps going; the read side is
/// authoritative for declaring the connection dead.
async fn write_task(
    peer: Peer,
    mut sink: MessageSink,
    mut conn_rx: mpsc::Receiver<Message>,
    conn: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            () = conn.cancelled() => return,
            message = conn_rx.recv() => match message {
                Some(message) => message,
                None => return,
            },
        };

        let sent_tx_hash = match &message {
            Message::Tx(raw) => Some(ChainHash::double_sha256(raw)),
            _ => None,
        };
        let command = message.command();

        if let Err(err) = sink.send(message).await {
            warn!(%command, %err, "failed to write message");
            continue;
        }
        trace!(%command, "sent message");

        if let Some(hash) = sent_tx_hash {
            if let Err(err) = peer.inner.handler.transaction_sent(hash).await {
                warn!(%hash, %err, "transaction-sent handler failed");
            }
        }
    }
}

/// Enqueues a PING with a fresh nonce every [`PING_INTERVAL`].
async fn pinger(peer: Peer) {
    let mut ticker = interval(PING_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes instantly.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = peer.inner.shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }

        if !peer.connected() {
            continue;
        }
        if let Err(err) = peer.write_message(Message::Ping(rand::random())) {
            debug!(%err, "not sending ping");
        }
    }
}

impl NetworkPeer for Peer {
    fn address(&self) -> &str {
        &self.inner.address
    }

    fn connected(&self) -> bool {
        self.socket_active() && self.handshake_complete()
    }

    fn is_healthy(&self) -> bool {
        self.connected()
    }

    fn write_message(&self, message: Message) -> Result<(), PeerError> {
        if !self.connected() {
            return Err(PeerError::NotConnected);
        }
        let writer = self.inner.writer.read().unwrap();
        let Some(sender) = writer.as_ref() else {
            return Err(PeerError::NotConnected);
        };
        sender.try_send(message).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => PeerError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => PeerError::NotConnected,
        })
    }

    fn announce_transaction(&self, hash: ChainHash) {
        if let Err(err) = self.write_message(Message::Inv(vec![InvVect::tx(hash)])) {
            debug!(%hash, %err, "failed to announce transaction");
        }
    }

    fn request_transaction(&self, hash: ChainHash) {
        if let Err(err) = self.write_message(Message::GetData(vec![InvVect::tx(hash)])) {
            debug!(%hash, %err, "failed to request transaction");
        }
    }

    fn announce_block(&self, hash: ChainHash) {
        if let Err(err) = self.write_message(Message::Inv(vec![InvVect::block(hash)])) {
            debug!(%hash, %err, "failed to announce block");
        }
    }

    fn request_block(&self, hash: ChainHash) {
        if let Err(err) = self.write_message(Message::GetData(vec![InvVect::block(hash)])) {
            debug!(%hash, %err, "failed to request block");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    #[async_trait::async_trait]
    impl PeerHandler for NoopHandler {
        async fn transaction_announced(
            &self,
            _: ChainHash,
            _: &dyn NetworkPeer,
        ) -> Result<(), crate::BoxError> {
            Ok(())
        }
        async fn block_announced(
            &self,
            _: ChainHash,
            _: &dyn NetworkPeer,
        ) -> Result<(), crate::BoxError> {
            Ok(())
        }
        async fn transaction_requested(
            &self,
            _: ChainHash,
        ) -> Result<Option<Vec<u8>>, crate::BoxError> {
            Ok(None)
        }
        async fn transaction_sent(&self, _: ChainHash) -> Result<(), crate::BoxError> {
            Ok(())
        }
        async fn transaction_rejected(
            &self,
            _: arc_wire::Reject,
            _: &dyn NetworkPeer,
        ) -> Result<(), crate::BoxError> {
            Ok(())
        }
        async fn block_received(
            &self,
            _: BlockMessage,
            _: &dyn NetworkPeer,
        ) -> Result<(), crate::BoxError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn writes_fail_while_disconnected() {
        // Port 1 refuses connections; the peer stays in the reconnect loop.
        let peer = Peer::new("127.0.0.1:1", Network::Regtest, Arc::new(NoopHandler));

        assert!(!peer.connected());
        assert!(matches!(
            peer.write_message(Message::Ping(1)),
            Err(PeerError::NotConnected),
        ));

        peer.shutdown();
    }
}
