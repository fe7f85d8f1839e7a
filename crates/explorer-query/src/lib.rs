use explorer_chain::Hash;
use serde::Serialize;
use thiserror::Error;

pub mod classifier;
pub use classifier::{classify, QueryClassification, QueryClassifier, QueryKind};

pub mod decoder;
pub use decoder::{BalanceConfiguration, DecodedTransaction, ExtrinsicDecoder};

pub mod resolver;
pub use resolver::{BlockRecord, BlockResolver, LocatedTransaction};

pub mod tracker;
pub use tracker::{NextBlockTracker, TrackerHandle, TrackerState};

pub mod session;
pub use session::{Explorer, QuerySession, QueryTarget, ResolutionStatus, SessionSnapshot};

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Error {
    #[error("indexer unavailable: {0}")]
    IndexerUnavailable(String),

    #[error("transaction {0} not found. Please check that the specified transaction hash is correct")]
    TransactionNotFound(String),

    #[error("could not fetch block: {0}")]
    BlockFetchFailed(String),

    #[error("transaction {0} not found in its block")]
    ExtrinsicNotFoundInBlock(Hash),

    #[error("subscription error {0}")]
    Subscription(String),

    #[error("invalid query {0}")]
    InvalidQuery(String),
}

impl From<explorer_indexer::Error> for Error {
    fn from(value: explorer_indexer::Error) -> Self {
        match value {
            explorer_indexer::Error::IndexerUnavailable(e) => Self::IndexerUnavailable(e),
            explorer_indexer::Error::TransactionNotFound(e) => Self::TransactionNotFound(e),
        }
    }
}
