use async_trait::async_trait;
use explorer_chain::BlockNumber;
use explorer_common::{measure_duration, metric};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

pub mod graphql;
pub use graphql::{GraphQLConfiguration, GraphQLIndexer};

#[cfg(feature = "testing")]
pub mod mock;

/// Callers log final failures louder
macro_rules! log_if_error {
    ($e: expr) => {{
        let result = $e;
        if let Err(e) = &result {
            debug!(message=%e);
        }
        result
    }};
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("indexer unavailable: {0}")]
    IndexerUnavailable(String),

    #[error("transaction {0} not found. Please check that the specified transaction hash is correct")]
    TransactionNotFound(String),
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Self::IndexerUnavailable(value.to_string())
    }
}

/// Secondary index from transaction hash to the number of the block including it
#[async_trait]
pub trait TransactionLocator: 'static + Send + Sync {
    /// Sends a single lookup for `tx_hash`. Never retries.
    async fn locate(&self, tx_hash: &str) -> Result<BlockNumber, Error>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum Configuration {
    #[cfg(feature = "testing")]
    #[serde(skip)]
    Mock(std::sync::Arc<mock::MockTransactionLocator>),

    #[serde(rename = "graphql")]
    GraphQL(GraphQLConfiguration),

    Disabled,
}

#[derive(Clone)]
pub enum Client {
    #[cfg(feature = "testing")]
    Mock(std::sync::Arc<mock::MockTransactionLocator>),

    GraphQL(GraphQLIndexer),

    Disabled,
}

impl Client {
    pub fn new(configuration: &Configuration) -> Result<Self, Error> {
        Ok(match configuration {
            #[cfg(feature = "testing")]
            Configuration::Mock(x) => Self::Mock(x.clone()),

            Configuration::GraphQL(x) => Self::GraphQL(GraphQLIndexer::new(x)?),
            Configuration::Disabled => Self::Disabled,
        })
    }
}

#[async_trait]
impl TransactionLocator for Client {
    #[instrument(name = "locate", skip(self))]
    async fn locate(&self, tx_hash: &str) -> Result<BlockNumber, Error> {
        let (result, duration) = measure_duration!(log_if_error!(match self {
            #[cfg(feature = "testing")]
            Self::Mock(locator) => locator.locate(tx_hash).await,

            Self::GraphQL(locator) => locator.locate(tx_hash).await,
            Self::Disabled => Err(Error::IndexerUnavailable("indexer endpoint is not configured".to_string())),
        }));

        metric!(counter[indexer_request] = 1, method = "locate");
        metric!(histogram[indexer_request_duration_milliseconds] = duration.as_millis(), method = "locate");
        metric!(on error result => counter [ indexer_request_error ] = 1, method = "locate");

        if let Ok(number) = &result {
            debug!(target: "indexer", "transaction {} is in block #{}", tx_hash, number);
        }

        result
    }
}
