use std::sync::Arc;

use explorer_chain::{BlockIdentifier, ChainNode, Event, Extrinsic, Hash, Header};
use serde::Serialize;
use tracing::{instrument, warn};

use crate::Error;

/// A block with everything needed to display it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockRecord {
    pub header: Header,
    pub extrinsics: Vec<Extrinsic>,

    /// Best effort, empty when the events could not be fetched
    pub events: Vec<Event>,
}

impl BlockRecord {
    pub fn hash(&self) -> &Hash {
        &self.header.hash
    }

    /// Events emitted while applying the extrinsic at `index`
    pub fn events_for(&self, index: usize) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |x| x.is_emitted_by(index))
    }
}

/// A transaction together with the block including it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocatedTransaction {
    block: BlockRecord,
    index: usize,
}

impl LocatedTransaction {
    pub fn block(&self) -> &BlockRecord {
        &self.block
    }

    /// Position of the transaction in its block
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn extrinsic(&self) -> &Extrinsic {
        &self.block.extrinsics[self.index]
    }

    pub fn into_block(self) -> BlockRecord {
        self.block
    }
}

fn locate(extrinsics: &[Extrinsic], tx_hash: &Hash) -> Result<usize, Error> {
    extrinsics
        .iter()
        .position(|x| &x.hash == tx_hash)
        .ok_or_else(|| Error::ExtrinsicNotFoundInBlock(tx_hash.clone()))
}

#[derive(Clone)]
pub struct BlockResolver {
    chain: Arc<dyn ChainNode>,
}

impl BlockResolver {
    pub fn new(chain: Arc<dyn ChainNode>) -> Self {
        Self { chain }
    }

    /// Fetches the block designated by `id`. Any failure but the events one aborts the resolution.
    #[instrument(name = "resolve_block", skip(self))]
    pub async fn resolve(&self, id: &BlockIdentifier) -> Result<BlockRecord, Error> {
        let (header, extrinsics) = self.fetch(id).await?;
        let events = self.fetch_events(&header.hash).await;

        Ok(BlockRecord { header, extrinsics, events })
    }

    /// Fetches the block designated by `id` and locates `tx_hash` in it. Events are only
    /// fetched once the transaction is known to be part of the block.
    #[instrument(name = "resolve_transaction", skip(self))]
    pub async fn resolve_transaction(&self, id: &BlockIdentifier, tx_hash: &Hash) -> Result<LocatedTransaction, Error> {
        let (header, extrinsics) = self.fetch(id).await?;
        let index = locate(&extrinsics, tx_hash)?;
        let events = self.fetch_events(&header.hash).await;

        Ok(LocatedTransaction {
            block: BlockRecord { header, extrinsics, events },
            index,
        })
    }

    /// Finds the position of `tx_hash` among the extrinsics of `record`
    pub fn locate_extrinsic<'a>(record: &'a BlockRecord, tx_hash: &Hash) -> Result<(usize, &'a Extrinsic), Error> {
        locate(&record.extrinsics, tx_hash).map(|index| (index, &record.extrinsics[index]))
    }

    async fn fetch(&self, id: &BlockIdentifier) -> Result<(Header, Vec<Extrinsic>), Error> {
        let hash = match id {
            BlockIdentifier::Hash(hash) => hash.clone(),
            BlockIdentifier::Number(number) => self
                .chain
                .block_hash(*number)
                .await
                .map_err(|e| Error::BlockFetchFailed(format!("could not get hash of block #{}: {}", number, e)))?
                .ok_or_else(|| Error::BlockFetchFailed(format!("block #{} does not exist", number)))?,
        };

        let block = self
            .chain
            .block(&hash)
            .await
            .map_err(|e| Error::BlockFetchFailed(format!("could not get block {}: {}", hash, e)))?
            .ok_or_else(|| Error::BlockFetchFailed(format!("block {} does not exist", hash)))?;

        let header = self
            .chain
            .extended_header(&hash)
            .await
            .map_err(|e| Error::BlockFetchFailed(format!("could not get header of block {}: {}", hash, e)))?
            .ok_or_else(|| Error::BlockFetchFailed(format!("block {} does not exist", hash)))?;

        Ok((header, block.extrinsics))
    }

    async fn fetch_events(&self, hash: &Hash) -> Vec<Event> {
        match self.chain.events(hash).await {
            Ok(events) => events,
            Err(e) => {
                warn!(message = "could not fetch events, continuing without them", block = %hash, error = %e);
                vec![]
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use explorer_chain::testing::{self, Failure, MockChainNode};
    use explorer_chain::{BlockIdentifier, ChainNode};

    use super::*;

    fn resolver(chain: MockChainNode) -> (BlockResolver, Arc<MockChainNode>) {
        let chain = Arc::new(chain);
        (BlockResolver::new(chain.clone() as Arc<dyn ChainNode>), chain)
    }

    fn chain_with_block_12345() -> MockChainNode {
        let extrinsics = vec![
            testing::timestamp_set(testing::extrinsic_hash(12345, 0), serde_json::json!(1_700_000_000_000u64)),
            testing::balances_transfer(testing::extrinsic_hash(12345, 1), "5Alice", "5Bob", 10, "0"),
        ];

        MockChainNode::new().with_block(testing::block(12345, extrinsics)).with_events(
            testing::block_hash(12345),
            vec![
                testing::event(0, "system", "ExtrinsicSuccess"),
                testing::event(1, "balances", "Transfer"),
                testing::event(1, "system", "ExtrinsicSuccess"),
            ],
        )
    }

    #[tokio::test]
    async fn block_is_resolved_by_number() {
        // Given
        let (resolver, _) = resolver(chain_with_block_12345());

        // When
        let record = resolver.resolve(&BlockIdentifier::Number(12345)).await.unwrap();

        // Then
        assert_eq!(record.hash(), &testing::block_hash(12345));
        assert_eq!(record.header.author.as_deref(), Some(MockChainNode::AUTHOR));
        assert_eq!(record.extrinsics.len(), 2);
        assert_eq!(record.events.len(), 3);
        assert_eq!(record.events_for(1).count(), 2);
    }

    #[tokio::test]
    async fn block_is_resolved_by_hash_without_number_lookup() {
        let (resolver, chain) = resolver(chain_with_block_12345());

        let record = resolver.resolve(&BlockIdentifier::Hash(testing::block_hash(12345))).await.unwrap();

        assert_eq!(record.header.number, 12345);
        assert_eq!(chain.calls("block_hash"), 0);
    }

    #[tokio::test]
    async fn unknown_block_number_fails() {
        let (resolver, chain) = resolver(chain_with_block_12345());

        let result = resolver.resolve(&BlockIdentifier::Number(99)).await;

        assert!(matches!(result, Err(Error::BlockFetchFailed(_))));
        assert_eq!(chain.calls("block"), 0);
    }

    #[tokio::test]
    async fn body_failure_aborts_the_resolution() {
        let (resolver, chain) = resolver(chain_with_block_12345().with_failure(Failure::Block));

        let result = resolver.resolve(&BlockIdentifier::Number(12345)).await;

        assert!(matches!(result, Err(Error::BlockFetchFailed(_))));
        assert_eq!(chain.calls("extended_header"), 0);
        assert_eq!(chain.calls("events"), 0);
    }

    #[tokio::test]
    async fn extended_header_failure_aborts_the_resolution() {
        let (resolver, _) = resolver(chain_with_block_12345().with_failure(Failure::ExtendedHeader));

        let result = resolver.resolve(&BlockIdentifier::Number(12345)).await;

        assert!(matches!(result, Err(Error::BlockFetchFailed(_))));
    }

    #[tokio::test]
    async fn events_failure_yields_an_empty_list() {
        // Given
        let (resolver, _) = resolver(chain_with_block_12345().with_failure(Failure::Events));

        // When
        let record = resolver.resolve(&BlockIdentifier::Number(12345)).await.unwrap();

        // Then
        assert_eq!(record.extrinsics.len(), 2);
        assert!(record.events.is_empty());
    }

    #[tokio::test]
    async fn transaction_is_located_in_its_block() {
        // Given
        let (resolver, _) = resolver(chain_with_block_12345());
        let tx_hash = testing::extrinsic_hash(12345, 1);

        // When
        let located = resolver.resolve_transaction(&BlockIdentifier::Number(12345), &tx_hash).await.unwrap();

        // Then
        assert_eq!(located.index(), 1);
        assert_eq!(located.extrinsic().hash, tx_hash);
        assert_eq!(located.block().events_for(located.index()).count(), 2);
    }

    #[tokio::test]
    async fn transaction_missing_from_its_block_fails_before_fetching_events() {
        // Given
        let (resolver, chain) = resolver(chain_with_block_12345());
        let tx_hash = testing::hash(404);

        // When
        let result = resolver.resolve_transaction(&BlockIdentifier::Number(12345), &tx_hash).await;

        // Then
        assert_eq!(result, Err(Error::ExtrinsicNotFoundInBlock(tx_hash)));
        assert_eq!(chain.calls("events"), 0);
    }

    #[tokio::test]
    async fn extrinsic_is_located_in_a_record() {
        let (resolver, _) = resolver(chain_with_block_12345());
        let record = resolver.resolve(&BlockIdentifier::Number(12345)).await.unwrap();

        let (index, extrinsic) = BlockResolver::locate_extrinsic(&record, &testing::extrinsic_hash(12345, 0)).unwrap();

        assert_eq!(index, 0);
        assert_eq!(extrinsic.call.section, "timestamp");
        assert!(BlockResolver::locate_extrinsic(&record, &testing::hash(1)).is_err());
    }
}
