//! The service handle answering [`BlockTxRequest`]s.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use tower::Service;

use arc_types::{
    blocktx::{BlockTxRequest, BlockTxResponse},
    StoreError,
};

use crate::store::BlockTxStore;

/// A cheap-to-clone handle mapping [`BlockTxRequest`]s onto store calls.
///
/// This is the boundary Metamorph talks to; in a single process it wraps
/// the store directly, across processes a transport implementing the same
/// `tower::Service` contract slots in unchanged.
#[derive(Clone)]
pub struct BlockTxHandle {
    store: Arc<dyn BlockTxStore>,
}

impl BlockTxHandle {
    pub fn new(store: Arc<dyn BlockTxStore>) -> Self {
        Self { store }
    }
}

impl Service<BlockTxRequest> for BlockTxHandle {
    type Response = BlockTxResponse;
    type Error = tower::BoxError;
    type Future =
        Pin<Box<dyn Future<Output = Result<BlockTxResponse, tower::BoxError>> + Send + 'static>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: BlockTxRequest) -> Self::Future {
        let store = Arc::clone(&self.store);
        Box::pin(async move { map_request(&*store, request).await })
    }
}

async fn map_request(
    store: &dyn BlockTxStore,
    request: BlockTxRequest,
) -> Result<BlockTxResponse, tower::BoxError> {
    match request {
        BlockTxRequest::RegisterTransaction { hash, source } => Ok(
            BlockTxResponse::RegisterTransaction(store.register_transaction(hash, &source).await?),
        ),
        BlockTxRequest::TransactionBlocks(hashes) => Ok(BlockTxResponse::TransactionBlocks(
            store.get_transaction_blocks(&hashes).await?,
        )),
        BlockTxRequest::MerklePath(hash) => {
            match store.get_transaction_merkle_path(&hash).await {
                Ok(path) => Ok(BlockTxResponse::MerklePath(Some(path))),
                Err(StoreError::NotFound) => Ok(BlockTxResponse::MerklePath(None)),
                Err(err) => Err(err.into()),
            }
        }
    }
}
