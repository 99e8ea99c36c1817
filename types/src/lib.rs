//! ARC shared types.
//!
//! This crate holds the data types shared between the Metamorph and BlockTx
//! services and the P2P layer:
//!
//! - [`ChainHash`] — the 32-byte double-SHA-256 identifier used for both
//!   transactions and blocks.
//! - [`TransactionStatus`] — the ordered lifecycle status enum.
//! - The records persisted by the service stores.
//! - The [`blocktx`] request/response enums answered by the BlockTx service
//!   handle.

pub mod blocktx;
mod error;
mod hash;
mod status;
mod types;

pub use error::StoreError;
pub use hash::ChainHash;
pub use status::TransactionStatus;
pub use types::{
    BlockGap, BlockRecord, DbMode, RegisteredTransaction, TransactionBlock, TransactionRecord,
    LOCKED_BY_NONE,
};
