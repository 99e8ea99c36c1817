use arc_types::StoreError;

use crate::merkle::MerkleError;

/// Errors from the BlockTx engine.
#[derive(Debug, thiserror::Error)]
pub enum BlockTxError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("merkle error: {0}")]
    Merkle(#[from] MerkleError),
}
