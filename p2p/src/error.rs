use arc_wire::WireError;

/// Errors from a peer connection.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// The peer is not connected (or not yet through the handshake).
    #[error("peer is not connected")]
    NotConnected,
    /// The bounded outbound queue is full.
    #[error("peer outbound queue is full")]
    QueueFull,
    /// The handshake did not complete in time.
    #[error("handshake timed out")]
    HandshakeTimeout,
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
