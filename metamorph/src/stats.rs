//! Processor counters.
//!
//! Handed to the processor at construction and read by the health
//! endpoint; there is no process-wide registry.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::Instant;

/// Lifecycle counters for one processor instance.
pub struct ProcessorStats {
    start_time: Instant,
    pub received: AtomicU64,
    pub stored: AtomicU64,
    pub announced: AtomicU64,
    pub requested: AtomicU64,
    pub sent: AtomicU64,
    pub seen: AtomicU64,
    pub mined: AtomicU64,
    pub rejected: AtomicU64,
}

impl Default for ProcessorStats {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            received: AtomicU64::new(0),
            stored: AtomicU64::new(0),
            announced: AtomicU64::new(0),
            requested: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            seen: AtomicU64::new(0),
            mined: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }
}

impl ProcessorStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds since this processor started.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn incr(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
