use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod types;
pub use types::{Block, BlockIdentifier, BlockNumber, Call, CallArgument, CallIndex, Event, Extrinsic, Hash, Header, Phase};

mod client;
pub use client::RpcChainNode;

#[cfg(feature = "testing")]
pub mod testing;

pub const DEFAULT_NODE_ENDPOINT: &str = "ws://127.0.0.1:9944";

#[derive(Error, Debug)]
pub enum Error {
    #[error("rpc error {0}")]
    Rpc(String),

    #[error("transport error {0}")]
    Transport(String),

    #[error("wrong format error {0}")]
    Format(String),

    #[error("invalid hash {0}")]
    InvalidHash(String),

    #[error("subscription error {0}")]
    Subscription(String),
}

impl From<jsonrpsee::core::ClientError> for Error {
    fn from(value: jsonrpsee::core::ClientError) -> Self {
        match value {
            jsonrpsee::core::ClientError::Call(e) => Error::Rpc(e.to_string()),
            jsonrpsee::core::ClientError::ParseError(e) => Error::Format(e.to_string()),
            e => Error::Transport(e.to_string()),
        }
    }
}

/// Live feed of newly produced headers. Dropping the stream closes the underlying subscription.
pub type HeaderStream = BoxStream<'static, Result<Header, Error>>;

/// Read access to a chain node. Lookups of things that may legitimately not exist
/// (a block not produced yet, a hash that is not a block hash) answer `Ok(None)`
/// instead of failing, so callers can probe without going through the error path.
#[async_trait]
pub trait ChainNode: 'static + Send + Sync {
    /// Hash of the block at `number`, `None` if it was not produced yet
    async fn block_hash(&self, number: BlockNumber) -> Result<Option<Hash>, Error>;

    /// Plain header of the block with `hash`, `None` if the node does not know it
    async fn header(&self, hash: &Hash) -> Result<Option<Header>, Error>;

    /// Header and extrinsics of the block with `hash`
    async fn block(&self, hash: &Hash) -> Result<Option<Block>, Error>;

    /// Header of the block with `hash` including its author
    async fn extended_header(&self, hash: &Hash) -> Result<Option<Header>, Error>;

    /// Events emitted in the block with `hash`
    async fn events(&self, hash: &Hash) -> Result<Vec<Event>, Error>;

    async fn subscribe_new_heads(&self) -> Result<HeaderStream, Error>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub endpoint: String,

    /// Request timeout in seconds
    pub timeout: u64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_NODE_ENDPOINT.to_string(),
            timeout: 10,
        }
    }
}
