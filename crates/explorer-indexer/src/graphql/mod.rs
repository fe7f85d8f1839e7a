use std::time::Duration;

use async_trait::async_trait;
use explorer_chain::BlockNumber;
use explorer_common::cache::ExpiringCache;
use reqwest::{Client as HTTPClient, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{Error, TransactionLocator};

const TX_INDEX_QUERY: &str = "query TxIndex($id: String!) { txIndex(id: $id) { blockNumber } }";

fn default_cache_validity() -> u64 {
    60
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GraphQLConfiguration {
    pub endpoint: String,

    /// Request timeout in seconds
    pub timeout: u64,

    /// How long, in seconds, a located transaction is served from memory
    #[serde(default = "default_cache_validity")]
    pub cache_validity: u64,
}

#[derive(Deserialize, Debug)]
struct Response {
    data: Option<Data>,

    #[serde(default)]
    errors: Vec<ResponseError>,
}

#[derive(Deserialize, Debug)]
struct Data {
    #[serde(rename = "txIndex")]
    tx_index: Option<TxIndex>,
}

#[derive(Deserialize, Debug)]
struct TxIndex {
    #[serde(rename = "blockNumber")]
    block_number: Option<Value>,
}

#[derive(Deserialize, Debug)]
struct ResponseError {
    message: String,
}

impl Response {
    fn into_block_number(self, tx_hash: &str) -> Result<BlockNumber, Error> {
        if !self.errors.is_empty() {
            let messages: Vec<_> = self.errors.into_iter().map(|x| x.message).collect();
            return Err(Error::IndexerUnavailable(messages.join(", ")));
        }

        let block_number = self.data.and_then(|x| x.tx_index).and_then(|x| x.block_number);

        match block_number {
            Some(Value::Number(value)) => value.as_u64(),
            Some(Value::String(value)) => value.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| Error::TransactionNotFound(tx_hash.to_string()))
    }
}

/// Locates transactions through the `txIndex` entity of a GraphQL indexer
#[derive(Clone)]
pub struct GraphQLIndexer {
    endpoint: Url,
    client: HTTPClient,

    cache: ExpiringCache<String, BlockNumber>,
    cache_validity: Duration,
}

impl GraphQLIndexer {
    pub fn new(configuration: &GraphQLConfiguration) -> Result<Self, Error> {
        let endpoint = Url::parse(&configuration.endpoint).map_err(|e| Error::IndexerUnavailable(format!("invalid url {}: {}", configuration.endpoint, e)))?;

        let client = HTTPClient::builder().timeout(Duration::from_secs(configuration.timeout)).build()?;

        Ok(Self {
            endpoint,
            client,

            cache: ExpiringCache::new(1024),
            cache_validity: Duration::from_secs(configuration.cache_validity),
        })
    }

    async fn fetch_block_number(&self, tx_hash: &str) -> Result<BlockNumber, Error> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&json!({
                "query": TX_INDEX_QUERY,
                "variables": { "id": tx_hash }
            }))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(Error::IndexerUnavailable(format!("request error url={} status={}, body={}", self.endpoint, status, text)));
        }

        serde_json::from_str::<Response>(&text)
            .map_err(|e| Error::IndexerUnavailable(format!("malformed response {}", e)))?
            .into_block_number(tx_hash)
    }
}

#[async_trait]
impl TransactionLocator for GraphQLIndexer {
    async fn locate(&self, tx_hash: &str) -> Result<BlockNumber, Error> {
        if let Some(number) = self.cache.get(&tx_hash.to_string()) {
            return Ok(number);
        }

        let number = self.fetch_block_number(tx_hash).await?;
        self.cache.insert(tx_hash.to_string(), number, self.cache_validity);

        Ok(number)
    }
}
