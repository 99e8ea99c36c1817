//! Maps inbound peer events onto processor status updates.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use arc_p2p::{BoxError, NetworkPeer};
use arc_types::{ChainHash, StoreError, TransactionStatus};
use arc_wire::{BlockMessage, Reject};

use crate::{
    blocktx_client::BlockTxClient, processor::Processor, store::MetamorphStore,
};

/// The Metamorph side of a peer connection.
///
/// Every network observation about a transaction we track becomes a status
/// update: an INV means the network has seen it, a GETDATA means a node
/// wants its bytes, a written TX message means it went out, a REJECT is
/// terminal. Blocks are BlockTx's business and are ignored here.
pub struct MetamorphPeerHandler<B> {
    processor: Arc<Processor<B>>,
    store: Arc<dyn MetamorphStore>,
}

impl<B> MetamorphPeerHandler<B> {
    pub fn new(processor: Arc<Processor<B>>, store: Arc<dyn MetamorphStore>) -> Self {
        Self { processor, store }
    }
}

#[async_trait]
impl<B> arc_p2p::PeerHandler for MetamorphPeerHandler<B>
where
    B: BlockTxClient,
    B::Future: Send,
{
    async fn transaction_announced(
        &self,
        hash: ChainHash,
        peer: &dyn NetworkPeer,
    ) -> Result<(), BoxError> {
        self.processor
            .send_status_for_transaction(
                &hash,
                TransactionStatus::SeenOnNetwork,
                peer.address(),
                None,
            )
            .await?;
        Ok(())
    }

    async fn block_announced(
        &self,
        _hash: ChainHash,
        _peer: &dyn NetworkPeer,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    async fn transaction_requested(&self, hash: ChainHash) -> Result<Option<Vec<u8>>, BoxError> {
        let record = match self.store.get(&hash).await {
            Ok(record) => record,
            Err(StoreError::NotFound) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        if let Err(err) = self
            .processor
            .send_status_for_transaction(
                &hash,
                TransactionStatus::RequestedByNetwork,
                "getdata",
                None,
            )
            .await
        {
            warn!(%hash, %err, "failed to record requested status");
        }

        Ok(Some(record.raw_tx))
    }

    async fn transaction_sent(&self, hash: ChainHash) -> Result<(), BoxError> {
        self.processor
            .send_status_for_transaction(&hash, TransactionStatus::SentToNetwork, "writer", None)
            .await?;
        Ok(())
    }

    async fn transaction_rejected(
        &self,
        reject: Reject,
        peer: &dyn NetworkPeer,
    ) -> Result<(), BoxError> {
        let Some(hash) = reject.hash else {
            return Ok(());
        };
        self.processor
            .send_status_for_transaction(
                &hash,
                TransactionStatus::Rejected,
                peer.address(),
                Some(reject.reason),
            )
            .await?;
        Ok(())
    }

    async fn block_received(
        &self,
        _block: BlockMessage,
        _peer: &dyn NetworkPeer,
    ) -> Result<(), BoxError> {
        Ok(())
    }
}
