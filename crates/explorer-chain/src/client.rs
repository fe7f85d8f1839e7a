use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use explorer_common::{log_if_error, measure_duration, metric};
use futures::StreamExt;
use jsonrpsee::core::{RpcResult, SubscriptionResult};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::ws_client::{WsClient, WsClientBuilder};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::instrument;

use crate::{Block, BlockNumber, ChainNode, Configuration, Error, Event, Hash, Header, HeaderStream};

/// Header as rendered by the node itself. The number is hex encoded and the
/// hash of the header is not part of the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHeader {
    #[serde(deserialize_with = "hex_number")]
    pub number: BlockNumber,
    pub parent_hash: Hash,
    pub state_root: Hash,
    pub extrinsics_root: Hash,
}

impl NodeHeader {
    fn with_hash(self, hash: Hash) -> Header {
        Header {
            number: self.number,
            hash,
            parent_hash: self.parent_hash,
            state_root: self.state_root,
            extrinsics_root: self.extrinsics_root,
            author: None,
        }
    }
}

fn hex_number<'de, D>(deserializer: D) -> Result<BlockNumber, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    let digits = value.strip_prefix("0x").unwrap_or(&value);

    BlockNumber::from_str_radix(digits, 16).map_err(serde::de::Error::custom)
}

#[rpc(client, namespace = "chain")]
pub trait NodeApi {
    #[method(name = "getBlockHash")]
    async fn get_block_hash(&self, number: Option<BlockNumber>) -> RpcResult<Option<Hash>>;

    #[method(name = "getHeader")]
    async fn get_header(&self, hash: Option<Hash>) -> RpcResult<Option<NodeHeader>>;

    #[subscription(name = "subscribeNewHeads" => "newHead", unsubscribe = "unsubscribeNewHeads", item = NodeHeader)]
    async fn subscribe_new_heads(&self) -> SubscriptionResult;
}

/// Decoded views served by the explorer gateway sitting next to the node
#[rpc(client, namespace = "explorer")]
pub trait GatewayApi {
    #[method(name = "getBlock")]
    async fn get_block(&self, hash: Hash) -> RpcResult<Option<Block>>;

    #[method(name = "getExtendedHeader")]
    async fn get_extended_header(&self, hash: Hash) -> RpcResult<Option<Header>>;

    #[method(name = "getEvents")]
    async fn get_events(&self, hash: Hash) -> RpcResult<Vec<Event>>;
}

/// [`ChainNode`] backed by a JSON-RPC WebSocket connection
#[derive(Clone)]
pub struct RpcChainNode {
    client: Arc<WsClient>,
}

impl RpcChainNode {
    pub async fn connect(configuration: &Configuration) -> Result<Self, Error> {
        let client = WsClientBuilder::default()
            .request_timeout(Duration::from_secs(configuration.timeout))
            .connection_timeout(Duration::from_secs(5))
            .build(&configuration.endpoint)
            .await
            .map_err(|e| Error::Transport(format!("could not connect to {}: {}", configuration.endpoint, e)))?;

        Ok(Self { client: Arc::new(client) })
    }
}

#[async_trait]
impl ChainNode for RpcChainNode {
    #[instrument(name = "block_hash", skip(self))]
    async fn block_hash(&self, number: BlockNumber) -> Result<Option<Hash>, Error> {
        let (result, duration) = measure_duration!(log_if_error!(self.client.get_block_hash(Some(number)).await));

        metric!(histogram[chain_rpc] = duration.as_millis(), method = "get_block_hash");
        metric!(on error result => counter [ chain_rpc_error ] = 1, method = "get_block_hash");

        Ok(result?.filter(|hash| !hash.is_zero()))
    }

    #[instrument(name = "header", skip(self))]
    async fn header(&self, hash: &Hash) -> Result<Option<Header>, Error> {
        // Probing unknown hashes is expected, a miss is reported as None and not logged
        let (result, duration) = measure_duration!(self.client.get_header(Some(hash.clone())).await);

        metric!(histogram[chain_rpc] = duration.as_millis(), method = "get_header");
        metric!(on error result => counter [ chain_rpc_error ] = 1, method = "get_header");

        Ok(result?.map(|header| header.with_hash(hash.clone())))
    }

    #[instrument(name = "block", skip(self))]
    async fn block(&self, hash: &Hash) -> Result<Option<Block>, Error> {
        let (result, duration) = measure_duration!(log_if_error!(self.client.get_block(hash.clone()).await));

        metric!(histogram[chain_rpc] = duration.as_millis(), method = "get_block");
        metric!(on error result => counter [ chain_rpc_error ] = 1, method = "get_block");

        Ok(result?)
    }

    #[instrument(name = "extended_header", skip(self))]
    async fn extended_header(&self, hash: &Hash) -> Result<Option<Header>, Error> {
        let (result, duration) = measure_duration!(log_if_error!(self.client.get_extended_header(hash.clone()).await));

        metric!(histogram[chain_rpc] = duration.as_millis(), method = "get_extended_header");
        metric!(on error result => counter [ chain_rpc_error ] = 1, method = "get_extended_header");

        Ok(result?)
    }

    #[instrument(name = "events", skip(self))]
    async fn events(&self, hash: &Hash) -> Result<Vec<Event>, Error> {
        let (result, duration) = measure_duration!(self.client.get_events(hash.clone()).await);

        metric!(histogram[chain_rpc] = duration.as_millis(), method = "get_events");
        metric!(on error result => counter [ chain_rpc_error ] = 1, method = "get_events");

        Ok(result?)
    }

    #[instrument(name = "subscribe_new_heads", skip(self))]
    async fn subscribe_new_heads(&self) -> Result<HeaderStream, Error> {
        let subscription = log_if_error!(NodeApiClient::subscribe_new_heads(self.client.as_ref()).await)
            .map_err(|e| Error::Subscription(e.to_string()))?;

        metric!(counter[chain_subscription] = 1, method = "subscribe_new_heads");

        // The node does not send the hash along with the header, it is looked up by number
        let client = self.client.clone();
        let stream = subscription.then(move |item| {
            let client = client.clone();
            async move {
                let header = item.map_err(|e| Error::Format(e.to_string()))?;
                let hash = client
                    .get_block_hash(Some(header.number))
                    .await?
                    .filter(|hash| !hash.is_zero())
                    .ok_or_else(|| Error::Subscription(format!("no hash for announced block #{}", header.number)))?;

                Ok::<Header, Error>(header.with_hash(hash))
            }
        });

        Ok(stream.boxed())
    }
}
