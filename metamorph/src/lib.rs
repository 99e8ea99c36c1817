//! # ARC Metamorph
//!
//! The transaction-state engine. Metamorph accepts raw transactions,
//! persists them, announces them into the peer network, tracks their
//! status as the network reacts (requested, sent, seen, rejected), retries
//! the ones the network ignores, and reconciles against BlockTx until each
//! transaction is mined or given up on.
//!
//! Submitters either block on [`Server::put_transaction`] until a desired
//! status is reached or register an HTTP callback for later notification.
//! Duplicate submissions across a fleet of instances resolve to a single
//! owner via BlockTx registration; non-owners forward the request rather
//! than double-announce.

mod blocktx_client;
mod callbacker;
mod config;
mod error;
mod peer_handler;
mod processor;
mod response;
mod response_map;
mod server;
mod stats;

pub mod constants;
pub mod store;

pub use blocktx_client::BlockTxClient;
pub use callbacker::Callbacker;
pub use config::{default_host_name, MetamorphConfig};
pub use error::MetamorphError;
pub use peer_handler::MetamorphPeerHandler;
pub use processor::{Processor, ProcessorRequest};
pub use response::{ProcessorResponse, StatusAndError};
pub use response_map::ProcessorResponseMap;
pub use server::{
    HealthReply, Server, TransactionForwarder, TransactionRequest, TransactionStatusReply,
};
pub use stats::ProcessorStats;
