//! BlockTx service requests and responses.
//!
//! This pairs each [`BlockTxRequest`] variant with the [`BlockTxResponse`]
//! variant of the same name. The BlockTx crate provides the
//! `tower::Service` answering these; Metamorph is the main consumer.

use crate::{ChainHash, RegisteredTransaction, TransactionBlock};

/// A request to the BlockTx service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockTxRequest {
    /// Register a transaction fingerprint with its submitting instance.
    ///
    /// The response carries the canonical owner (first registrant wins) and
    /// any already-known block association.
    RegisterTransaction {
        hash: ChainHash,
        source: String,
    },

    /// Which of these transactions have been mined, and where?
    ///
    /// Unknown hashes are simply absent from the response.
    TransactionBlocks(Vec<ChainHash>),

    /// The BUMP string proving inclusion of a mined transaction.
    MerklePath(ChainHash),
}

/// A response from the BlockTx service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockTxResponse {
    /// Response to [`BlockTxRequest::RegisterTransaction`].
    RegisterTransaction(RegisteredTransaction),

    /// Response to [`BlockTxRequest::TransactionBlocks`].
    TransactionBlocks(Vec<TransactionBlock>),

    /// Response to [`BlockTxRequest::MerklePath`].
    MerklePath(Option<String>),
}
