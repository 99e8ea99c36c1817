//! Status callbacks to client HTTP endpoints.
//!
//! Delivery is at-least-once with bounded retries and strictly best
//! effort: a callback that keeps failing is logged and dropped, the store
//! stays authoritative.

use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, info, warn};

use arc_helper::time::current_unix_timestamp;
use arc_types::{ChainHash, TransactionRecord};

use crate::constants::{CALLBACK_INTERVAL, CALLBACK_REQUEST_TIMEOUT, CALLBACK_TRIES};

/// The JSON body POSTed to the client's callback URL.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CallbackPayload<'a> {
    txid: String,
    tx_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    block_hash: Option<ChainHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    block_height: Option<u64>,
    /// Unix seconds.
    timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    extra_info: Option<&'a str>,
}

/// Posts status notifications with exponential backoff.
#[derive(Clone)]
pub struct Callbacker {
    client: reqwest::Client,
    tries: u32,
    initial_delay: Duration,
}

impl Default for Callbacker {
    fn default() -> Self {
        Self::new()
    }
}

impl Callbacker {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(CALLBACK_REQUEST_TIMEOUT)
                .build()
                .expect("callback http client must build"),
            tries: CALLBACK_TRIES,
            initial_delay: CALLBACK_INTERVAL,
        }
    }

    /// Overrides the retry schedule.
    #[must_use]
    pub fn with_retry(mut self, tries: u32, initial_delay: Duration) -> Self {
        self.tries = tries;
        self.initial_delay = initial_delay;
        self
    }

    /// Fire-and-forget delivery with the full retry schedule.
    pub fn dispatch(&self, record: TransactionRecord) {
        let callbacker = self.clone();
        tokio::spawn(async move { callbacker.send_callback(&record).await });
    }

    /// Fire-and-forget single attempt, used for non-final statuses.
    pub fn dispatch_once(&self, record: TransactionRecord) {
        let callbacker = self.clone();
        tokio::spawn(async move {
            let _ = callbacker.attempt(&record).await;
        });
    }

    /// Posts the record's status until a 200 comes back or the attempts
    /// run out.
    pub async fn send_callback(&self, record: &TransactionRecord) {
        let Some(url) = record.callback_url.as_deref() else {
            return;
        };

        let mut delay = self.initial_delay;
        for _ in 0..self.tries {
            match self.attempt(record).await {
                Ok(true) => return,
                Ok(false) => {}
                Err(err) => {
                    warn!(%url, hash = %record.hash, %err, "callback attempt failed");
                }
            }
            sleep(delay).await;
            delay *= 2;
        }

        error!(
            %url,
            hash = %record.hash,
            tries = self.tries,
            "giving up on callback delivery",
        );
    }

    /// One POST. `Ok(true)` on a 200 response.
    async fn attempt(&self, record: &TransactionRecord) -> Result<bool, reqwest::Error> {
        let Some(url) = record.callback_url.as_deref() else {
            return Ok(true);
        };

        info!(
            %url,
            hash = %record.hash,
            status = %record.status,
            block_height = record.block_height,
            "sending callback",
        );

        let payload = CallbackPayload {
            txid: record.hash.to_string(),
            tx_status: record.status.to_string(),
            block_hash: record.block_hash,
            block_height: (record.block_height > 0).then_some(record.block_height),
            timestamp: current_unix_timestamp(),
            extra_info: record.reject_reason.as_deref(),
        };

        let mut request = self.client.post(url).json(&payload);
        if let Some(token) = record.callback_token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::OK {
            return Ok(true);
        }
        warn!(
            %url,
            hash = %record.hash,
            status = response.status().as_u16(),
            "callback response status not ok",
        );
        Ok(false)
    }
}
