use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::{Block, BlockNumber, Call, CallArgument, CallIndex, ChainNode, Error, Event, Extrinsic, Hash, Header, HeaderStream, Phase};

/// Deterministic hash derived from `seed`
pub fn hash(seed: u64) -> Hash {
    Hash::parse(&format!("0x{:064x}", seed)).expect("valid hash")
}

/// Hash of the block at `number` in the mock chain
pub fn block_hash(number: BlockNumber) -> Hash {
    hash(0xb10c_0000_0000 + number)
}

/// Hash of the `position`-th extrinsic of the block at `number` in the mock chain
pub fn extrinsic_hash(number: BlockNumber, position: u64) -> Hash {
    hash(0xe000_0000_0000 + number * 1_000 + position)
}

pub fn header(number: BlockNumber) -> Header {
    Header {
        number,
        hash: block_hash(number),
        parent_hash: if number == 0 { Hash::zero() } else { block_hash(number - 1) },
        state_root: hash(0x5000_0000 + number),
        extrinsics_root: hash(0x6000_0000 + number),
        author: None,
    }
}

pub fn block(number: BlockNumber, extrinsics: Vec<Extrinsic>) -> Block {
    Block {
        header: header(number),
        extrinsics,
    }
}

pub fn extrinsic(hash: Hash, section: &str, method: &str, index: CallIndex, args: Vec<(&str, Value)>) -> Extrinsic {
    Extrinsic {
        hash,
        call: Call {
            section: section.to_string(),
            method: method.to_string(),
            index,
            args: args.into_iter().map(|(name, value)| CallArgument::new(name, value)).collect(),
        },
        signer: None,
        tip: None,
    }
}

pub fn timestamp_set(hash: Hash, now: Value) -> Extrinsic {
    extrinsic(hash, "timestamp", "set", CallIndex(3, 0), vec![("now", now)])
}

pub fn balances_transfer(hash: Hash, signer: &str, dest: &str, value: u128, tip: &str) -> Extrinsic {
    let mut extrinsic = extrinsic(
        hash,
        "balances",
        "transferKeepAlive",
        CallIndex(5, 3),
        vec![("dest", json!({ "id": dest })), ("value", json!(value.to_string()))],
    );
    extrinsic.signer = Some(signer.to_string());
    extrinsic.tip = Some(tip.to_string());
    extrinsic
}

pub fn event(extrinsic_index: u32, section: &str, method: &str) -> Event {
    Event {
        phase: Phase::ApplyExtrinsic(extrinsic_index),
        section: section.to_string(),
        method: method.to_string(),
        data: vec![],
    }
}

/// Calls of the mock node that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Failure {
    BlockHash,
    Header,
    Block,
    ExtendedHeader,
    Events,
    Subscribe,
}

#[derive(Default)]
struct State {
    hashes: HashMap<BlockNumber, Hash>,
    blocks: HashMap<Hash, Block>,
    events: HashMap<Hash, Vec<Event>>,
    failures: Vec<Failure>,
    latency: Duration,
}

/// In-memory chain node. Blocks are registered with [`MockChainNode::insert_block`] and new
/// heads are pushed to live subscriptions with [`MockChainNode::announce`].
pub struct MockChainNode {
    state: Mutex<State>,
    heads: broadcast::Sender<Header>,
    calls: Mutex<HashMap<&'static str, usize>>,
    subscriptions: AtomicUsize,
}

impl Default for MockChainNode {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChainNode {
    pub const AUTHOR: &'static str = "5GNJqTPyNqANBkUVMN1LPPrxXnFouWXoe2wNSmmEoLctxiZY";

    pub fn new() -> Self {
        let (heads, _) = broadcast::channel(64);

        Self {
            state: Mutex::default(),
            heads,
            calls: Mutex::default(),
            subscriptions: AtomicUsize::new(0),
        }
    }

    pub fn with_block(self, block: Block) -> Self {
        self.insert_block(block);
        self
    }

    pub fn with_events(self, hash: Hash, events: Vec<Event>) -> Self {
        self.state.lock().unwrap().events.insert(hash, events);
        self
    }

    pub fn with_failure(self, failure: Failure) -> Self {
        self.state.lock().unwrap().failures.push(failure);
        self
    }

    /// Delay applied to every call before it answers
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state.lock().unwrap().latency = latency;
        self
    }

    pub fn insert_block(&self, block: Block) {
        let mut state = self.state.lock().unwrap();
        state.hashes.insert(block.header.number, block.header.hash.clone());
        state.blocks.insert(block.header.hash.clone(), block);
    }

    /// Registers the block of `header` and pushes it to every live subscription
    pub fn announce(&self, header: Header) {
        self.insert_block(Block {
            header: header.clone(),
            extrinsics: vec![],
        });

        let _ = self.heads.send(header);
    }

    /// Pushes `header` to live subscriptions without registering the block
    pub fn push_head(&self, header: Header) {
        let _ = self.heads.send(header);
    }

    /// Number of subscriptions currently open
    pub fn open_subscriptions(&self) -> usize {
        self.heads.receiver_count()
    }

    /// Number of subscriptions ever opened
    pub fn subscriptions_opened(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    async fn enter(&self, method: &'static str, failure: Failure) -> Result<(), Error> {
        *self.calls.lock().unwrap().entry(method).or_default() += 1;

        let (latency, fails) = {
            let state = self.state.lock().unwrap();
            (state.latency, state.failures.contains(&failure))
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if fails {
            return Err(Error::Transport(format!("{} unavailable", method)));
        }

        Ok(())
    }
}

#[async_trait]
impl ChainNode for MockChainNode {
    async fn block_hash(&self, number: BlockNumber) -> Result<Option<Hash>, Error> {
        self.enter("block_hash", Failure::BlockHash).await?;

        Ok(self.state.lock().unwrap().hashes.get(&number).cloned())
    }

    async fn header(&self, hash: &Hash) -> Result<Option<Header>, Error> {
        self.enter("header", Failure::Header).await?;

        Ok(self.state.lock().unwrap().blocks.get(hash).map(|x| x.header.clone()))
    }

    async fn block(&self, hash: &Hash) -> Result<Option<Block>, Error> {
        self.enter("block", Failure::Block).await?;

        Ok(self.state.lock().unwrap().blocks.get(hash).cloned())
    }

    async fn extended_header(&self, hash: &Hash) -> Result<Option<Header>, Error> {
        self.enter("extended_header", Failure::ExtendedHeader).await?;

        Ok(self.state.lock().unwrap().blocks.get(hash).map(|x| Header {
            author: Some(Self::AUTHOR.to_string()),
            ..x.header.clone()
        }))
    }

    async fn events(&self, hash: &Hash) -> Result<Vec<Event>, Error> {
        self.enter("events", Failure::Events).await?;

        Ok(self.state.lock().unwrap().events.get(hash).cloned().unwrap_or_default())
    }

    async fn subscribe_new_heads(&self) -> Result<HeaderStream, Error> {
        self.enter("subscribe_new_heads", Failure::Subscribe)
            .await
            .map_err(|e| Error::Subscription(e.to_string()))?;

        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let receiver = self.heads.subscribe();

        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(header) => return Some((Ok(header), receiver)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn unknown_block_hash_is_none() {
        let node = MockChainNode::new().with_block(block(1, vec![]));

        assert_eq!(node.block_hash(1).await.unwrap(), Some(block_hash(1)));
        assert_eq!(node.block_hash(2).await.unwrap(), None);
        assert_eq!(node.calls("block_hash"), 2);
    }

    #[tokio::test]
    async fn dropping_the_stream_closes_the_subscription() {
        // Given
        let node = MockChainNode::new();
        let mut stream = node.subscribe_new_heads().await.unwrap();
        assert_eq!(node.open_subscriptions(), 1);

        // When
        node.announce(header(7));
        let received = stream.next().await.unwrap().unwrap();
        drop(stream);

        // Then
        assert_eq!(received.number, 7);
        assert_eq!(node.open_subscriptions(), 0);
        assert_eq!(node.block_hash(7).await.unwrap(), Some(block_hash(7)));
    }

    #[tokio::test]
    async fn configured_failures_are_reported() {
        let node = MockChainNode::new().with_block(block(1, vec![])).with_failure(Failure::Block);

        assert!(node.block(&block_hash(1)).await.is_err());
        assert!(node.extended_header(&block_hash(1)).await.unwrap().is_some());
    }
}
