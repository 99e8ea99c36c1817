//! BlockTx configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use arc_types::DbMode;
use arc_wire::Network;

use crate::constants::{
    BECOME_PRIMARY_INTERVAL, DEFAULT_RETENTION_DAYS, DEFAULT_TRANSACTION_BATCH_SIZE,
    FILL_GAPS_INTERVAL,
};

/// The options the BlockTx service recognizes.
///
/// Loading this from a file or the environment is up to the embedding
/// binary; the defaults here are the documented production values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BlockTxConfig {
    /// Address the service boundary binds on.
    pub listen_addr: String,
    pub db_mode: DbMode,
    /// Blocks below this height are ignored entirely.
    pub starting_block_height: u64,
    pub record_retention_days: u32,
    /// `host:port` of each node to maintain a peer connection to.
    pub peers: Vec<String>,
    pub network: Network,
    /// Association writes go to the store in batches of this size.
    pub transaction_batch_size: usize,
    pub fill_gaps_interval: Duration,
    pub become_primary_interval: Duration,
    /// This instance's name in the primary-election row.
    pub host_name: String,
}

impl Default for BlockTxConfig {
    fn default() -> Self {
        Self {
            listen_addr: "localhost:8011".to_string(),
            db_mode: DbMode::default(),
            starting_block_height: 0,
            record_retention_days: DEFAULT_RETENTION_DAYS,
            peers: Vec::new(),
            network: Network::default(),
            transaction_batch_size: DEFAULT_TRANSACTION_BATCH_SIZE,
            fill_gaps_interval: FILL_GAPS_INTERVAL,
            become_primary_interval: BECOME_PRIMARY_INTERVAL,
            host_name: default_host_name(),
        }
    }
}

/// The machine hostname, as used for primary election.
pub fn default_host_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
