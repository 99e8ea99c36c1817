//! One in-flight transaction, as tracked by the response map.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Mutex,
};

use tokio::{sync::mpsc, time::Instant};

use arc_types::{ChainHash, TransactionStatus};

/// A status update pushed to a waiting submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusAndError {
    pub hash: ChainHash,
    pub status: TransactionStatus,
    pub err: Option<String>,
}

/// The in-memory record of one in-flight transaction.
///
/// Shared between the processor, the peer event path and the background
/// loops, so every field is interiorly mutable. The waiter channel is
/// single-consumer: the RPC call that submitted the transaction. Sends
/// never block; if the consumer is gone or slow the update is dropped,
/// authoritative state lives in the store.
pub struct ProcessorResponse {
    pub hash: ChainHash,
    start: Instant,
    status: Mutex<TransactionStatus>,
    err: Mutex<Option<String>>,
    retries: AtomicU32,
    channel: Option<mpsc::Sender<StatusAndError>>,
}

impl ProcessorResponse {
    /// An entry with a waiter attached, as created on submission.
    pub fn with_channel(
        hash: ChainHash,
        status: TransactionStatus,
        channel: mpsc::Sender<StatusAndError>,
    ) -> Self {
        Self {
            hash,
            start: Instant::now(),
            status: Mutex::new(status),
            err: Mutex::new(None),
            retries: AtomicU32::new(0),
            channel: Some(channel),
        }
    }

    /// A waiterless entry, as re-created when reloading unmined rows.
    pub fn with_status(hash: ChainHash, status: TransactionStatus) -> Self {
        Self {
            hash,
            start: Instant::now(),
            status: Mutex::new(status),
            err: Mutex::new(None),
            retries: AtomicU32::new(0),
            channel: None,
        }
    }

    pub fn status(&self) -> TransactionStatus {
        *self.status.lock().unwrap()
    }

    /// Updates the status and pushes it to the waiter, if any.
    pub fn set_status(&self, status: TransactionStatus) {
        *self.status.lock().unwrap() = status;
        self.emit(status);
    }

    pub fn err(&self) -> Option<String> {
        self.err.lock().unwrap().clone()
    }

    pub fn set_err(&self, err: Option<String>) {
        *self.err.lock().unwrap() = err;
    }

    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::Acquire)
    }

    /// Bumps the retry counter, returning the new value.
    pub fn increment_retry(&self) -> u32 {
        self.retries.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// When this entry was created; drives expiry.
    pub fn start(&self) -> Instant {
        self.start
    }

    fn emit(&self, status: TransactionStatus) {
        let Some(channel) = &self.channel else {
            return;
        };
        // Non-blocking by design: a full buffer means the waiter already
        // returned and stopped reading.
        let _ = channel.try_send(StatusAndError {
            hash: self.hash,
            status,
            err: self.err.lock().unwrap().clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn status_updates_reach_the_waiter() {
        let (tx, mut rx) = mpsc::channel(4);
        let hash = ChainHash::double_sha256(b"tx");
        let response = ProcessorResponse::with_channel(hash, TransactionStatus::Received, tx);

        response.set_status(TransactionStatus::Stored);
        response.set_err(Some("boom".to_string()));
        response.set_status(TransactionStatus::Rejected);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.status, TransactionStatus::Stored);
        assert_eq!(first.err, None);

        let second = rx.recv().await.unwrap();
        assert_eq!(second.status, TransactionStatus::Rejected);
        assert_eq!(second.err.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn full_waiter_buffers_drop_updates() {
        let (tx, _rx) = mpsc::channel(1);
        let response =
            ProcessorResponse::with_channel(ChainHash::ZERO, TransactionStatus::Received, tx);

        // The second send hits a full buffer; neither may block or panic.
        response.set_status(TransactionStatus::Stored);
        response.set_status(TransactionStatus::AnnouncedToNetwork);
        assert_eq!(response.status(), TransactionStatus::AnnouncedToNetwork);
    }

    #[tokio::test]
    async fn retries_count_up() {
        let response = ProcessorResponse::with_status(ChainHash::ZERO, TransactionStatus::Stored);
        assert_eq!(response.retries(), 0);
        assert_eq!(response.increment_retry(), 1);
        assert_eq!(response.increment_retry(), 2);
        assert_eq!(response.retries(), 2);
    }
}
