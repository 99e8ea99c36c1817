//! Timings and limits for the BlockTx engine.

use std::time::Duration;

/// Block/transaction associations are written in batches of this size.
pub const DEFAULT_TRANSACTION_BATCH_SIZE: usize = 1000;

/// How many recent heights the gap query inspects.
pub const BLOCK_GAP_RANGE: u64 = 288;

/// How long a block hash stays in the announcement cache. A second INV for
/// a cached hash does not trigger another GETDATA.
pub const ANNOUNCED_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// How often the gap filler runs (primary only).
pub const FILL_GAPS_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// How often every instance tries to claim or renew the primary lease.
pub const BECOME_PRIMARY_INTERVAL: Duration = Duration::from_secs(30);

/// How stale a lease must be before another host may take it.
pub const PRIMARY_LEASE: Duration = Duration::from_secs(60);

/// How often old block rows are purged (primary only).
pub const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default retention of processed blocks, in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 28;
