//! Timings and limits for peer connections.

use std::time::Duration;

/// How often we ping each peer to keep the connection alive.
pub const PING_INTERVAL: Duration = Duration::from_secs(120);

/// The backoff between reconnection attempts.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(10);

/// The timeout we set on handshakes.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

/// Capacity of the per-connection outbound message queue.
pub const WRITE_QUEUE_CAPACITY: usize = 100;

/// Transaction announcements are flushed once a batch reaches this size...
pub const INV_BATCH_SIZE: usize = 500;

/// ...or once the oldest entry in the batch is this old.
pub const INV_BATCH_AGE: Duration = Duration::from_millis(500);

/// Minimum connected peers for [`is_healthy`](crate::PeerNetwork::is_healthy)
/// to hold. A single peer is a partition hazard.
pub const HEALTHY_PEER_FLOOR: usize = 2;

/// How often the handshake waiter re-checks the verack flags.
pub(crate) const HANDSHAKE_POLL_INTERVAL: Duration = Duration::from_millis(100);
