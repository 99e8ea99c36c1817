//! Metamorph configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use arc_types::DbMode;
use arc_wire::Network;

use crate::constants::{
    CHECK_IF_MINED_INTERVAL, DEFAULT_CACHE_EXPIRY, DEFAULT_GRPC_MESSAGE_SIZE,
    DEFAULT_MAX_MONITORED_TXS, DEFAULT_RETENTION_DAYS, MAX_RETRIES,
    PROCESS_EXPIRED_TXS_INTERVAL,
};

/// The options the Metamorph service recognizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MetamorphConfig {
    /// Address the service boundary binds on.
    pub listen_addr: String,
    pub db_mode: DbMode,
    /// `host:port` of each node to maintain a peer connection to.
    pub peers: Vec<String>,
    pub network: Network,
    /// Cap on response-map entries reloaded at startup.
    pub max_monitored_txs: usize,
    /// Re-announce attempts before a transaction is rejected as expired.
    pub max_retries: u32,
    pub process_expired_txs_interval: Duration,
    pub process_check_if_mined_interval: Duration,
    /// Lifetime of a response-map entry.
    pub cache_expiry_time: Duration,
    pub record_retention_days: u32,
    /// Handed to the embedding gRPC transport; unused by the core.
    pub grpc_message_size: usize,
    /// This instance's name, used for record locking and owner routing.
    pub host_name: String,
}

impl Default for MetamorphConfig {
    fn default() -> Self {
        Self {
            listen_addr: "localhost:8001".to_string(),
            db_mode: DbMode::default(),
            peers: Vec::new(),
            network: Network::default(),
            max_monitored_txs: DEFAULT_MAX_MONITORED_TXS,
            max_retries: MAX_RETRIES,
            process_expired_txs_interval: PROCESS_EXPIRED_TXS_INTERVAL,
            process_check_if_mined_interval: CHECK_IF_MINED_INTERVAL,
            cache_expiry_time: DEFAULT_CACHE_EXPIRY,
            record_retention_days: DEFAULT_RETENTION_DAYS,
            grpc_message_size: DEFAULT_GRPC_MESSAGE_SIZE,
            host_name: default_host_name(),
        }
    }
}

/// The machine hostname, as used for locking and owner routing.
pub fn default_host_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
