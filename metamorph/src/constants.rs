//! Timings and limits for the Metamorph processor.

use std::time::Duration;

/// How long `put_transaction` waits for the requested status.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of a waiter channel; comfortably above the number of statuses
/// one transaction can emit.
pub const WAITER_CHANNEL_CAPACITY: usize = 16;

/// Re-announce attempts before an unconfirmed transaction is given up on.
pub const MAX_RETRIES: u32 = 16;

/// How stale a non-seen transaction must be before the retry loop touches
/// it.
pub const EXPIRED_TX_WINDOW: Duration = Duration::from_secs(15 * 60);

/// How often the response map sweeps out entries past their expiry.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Default period of the check-if-mined reconciliation loop.
pub const CHECK_IF_MINED_INTERVAL: Duration = Duration::from_secs(60);

/// Default period of the expiry/retry loop.
pub const PROCESS_EXPIRED_TXS_INTERVAL: Duration = Duration::from_secs(60);

/// Default lifetime of a response-map entry.
pub const DEFAULT_CACHE_EXPIRY: Duration = Duration::from_secs(24 * 60 * 60);

/// HTTP callback attempts before the event is dropped.
pub const CALLBACK_TRIES: u32 = 5;

/// Delay before the first callback retry; doubled on every failure.
pub const CALLBACK_INTERVAL: Duration = Duration::from_secs(5);

/// Timeout of a single callback HTTP request.
pub const CALLBACK_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// How often terminal records past retention are purged.
pub const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default retention of terminal transaction records, in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 14;

/// Default cap on response-map entries reloaded at startup.
pub const DEFAULT_MAX_MONITORED_TXS: usize = 100_000;

/// Default maximum gRPC message size, handed to the embedding transport.
pub const DEFAULT_GRPC_MESSAGE_SIZE: usize = 100 * 1024 * 1024;
