use arc_types::{ChainHash, StoreError};

/// Errors surfaced by the Metamorph service boundary.
#[derive(Debug, thiserror::Error)]
pub enum MetamorphError {
    /// The requested transaction is not known here.
    #[error("transaction not found")]
    NotFound,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The response deadline elapsed before the operation finished.
    #[error("request timed out")]
    Timeout,
    /// A forwarded request arrived at an instance that would forward it
    /// again.
    #[error("endless forwarding loop detected for {0}")]
    ForwardingLoop(ChainHash),
    /// The owning instance cannot be reached.
    #[error("owner {0} is unreachable")]
    Unavailable(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// A BlockTx round trip failed.
    #[error("blocktx request failed: {0}")]
    BlockTx(String),
    #[error("internal error: {0}")]
    Internal(String),
}
