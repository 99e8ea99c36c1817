//! The BlockTx client bound.

use tower::{Service, ServiceExt};

use arc_types::{
    blocktx::{BlockTxRequest, BlockTxResponse},
    ChainHash, RegisteredTransaction, TransactionBlock,
};

use crate::MetamorphError;

/// Anything that can answer [`BlockTxRequest`]s.
///
/// Blanket-implemented, so the in-process `BlockTxHandle`, a gRPC client
/// wrapper or a `tower::service_fn` test double all qualify without
/// ceremony.
pub trait BlockTxClient:
    Service<BlockTxRequest, Response = BlockTxResponse, Error = tower::BoxError>
    + Clone
    + Send
    + Sync
    + 'static
{
}

impl<T> BlockTxClient for T where
    T: Service<BlockTxRequest, Response = BlockTxResponse, Error = tower::BoxError>
        + Clone
        + Send
        + Sync
        + 'static
{
}

async fn call<B>(client: &B, request: BlockTxRequest) -> Result<BlockTxResponse, MetamorphError>
where
    B: BlockTxClient,
    B::Future: Send,
{
    let mut client = client.clone();
    client
        .ready()
        .await
        .map_err(|err| MetamorphError::BlockTx(err.to_string()))?
        .call(request)
        .await
        .map_err(|err| MetamorphError::BlockTx(err.to_string()))
}

/// Registers a fingerprint, returning the canonical owner and any known
/// block association.
pub async fn register_transaction<B>(
    client: &B,
    hash: ChainHash,
    source: &str,
) -> Result<RegisteredTransaction, MetamorphError>
where
    B: BlockTxClient,
    B::Future: Send,
{
    match call(
        client,
        BlockTxRequest::RegisterTransaction {
            hash,
            source: source.to_string(),
        },
    )
    .await?
    {
        BlockTxResponse::RegisterTransaction(registered) => Ok(registered),
        other => Err(MetamorphError::BlockTx(format!(
            "unexpected response: {other:?}",
        ))),
    }
}

/// Which of `hashes` are mined, and where.
pub async fn transaction_blocks<B>(
    client: &B,
    hashes: Vec<ChainHash>,
) -> Result<Vec<TransactionBlock>, MetamorphError>
where
    B: BlockTxClient,
    B::Future: Send,
{
    match call(client, BlockTxRequest::TransactionBlocks(hashes)).await? {
        BlockTxResponse::TransactionBlocks(blocks) => Ok(blocks),
        other => Err(MetamorphError::BlockTx(format!(
            "unexpected response: {other:?}",
        ))),
    }
}

/// The BUMP string for a mined transaction, if BlockTx has one.
pub async fn merkle_path<B>(client: &B, hash: ChainHash) -> Result<Option<String>, MetamorphError>
where
    B: BlockTxClient,
    B::Future: Send,
{
    match call(client, BlockTxRequest::MerklePath(hash)).await? {
        BlockTxResponse::MerklePath(path) => Ok(path),
        other => Err(MetamorphError::BlockTx(format!(
            "unexpected response: {other:?}",
        ))),
    }
}
