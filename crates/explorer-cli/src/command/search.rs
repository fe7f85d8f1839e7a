use std::sync::Arc;
use std::time::Duration;

use clap::{Args, ValueEnum};
use explorer_chain::RpcChainNode;
use explorer_indexer::Client as IndexerClient;
use explorer_query::{Explorer, QueryKind, ResolutionStatus};
use tracing::info;

use crate::core::configuration::Configuration;
use crate::core::tracing::Fmt;
use crate::core::Error;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindArgument {
    BlockHash,
    BlockNumber,
    TransactionHash,
    Address,
    CallData,
}

impl From<KindArgument> for QueryKind {
    fn from(value: KindArgument) -> Self {
        match value {
            KindArgument::BlockHash => QueryKind::BlockHash,
            KindArgument::BlockNumber => QueryKind::BlockNumber,
            KindArgument::TransactionHash => QueryKind::TransactionHash,
            KindArgument::Address => QueryKind::Address,
            KindArgument::CallData => QueryKind::CallData,
        }
    }
}

#[derive(Args, Clone)]
pub struct SearchCommandParameters {
    /// Raw search input
    pub input: String,

    /// Resolve the input as this kind instead of guessing it
    #[clap(long, value_enum)]
    pub kind: Option<KindArgument>,

    /// Seconds to wait for the block following the resolved one
    #[clap(long)]
    pub follow: Option<u64>,

    /// JSON configuration file
    #[clap(long)]
    pub profile: Option<String>,

    /// Node WebSocket endpoint
    #[clap(long)]
    pub node: Option<String>,

    /// Indexer GraphQL endpoint
    #[clap(long)]
    pub indexer: Option<String>,
}

pub async fn command_search(params: SearchCommandParameters) -> Result<(), Error> {
    let configuration = Configuration::load(params.profile.as_deref())?
        .with_node(params.node.clone())
        .with_indexer(params.indexer.clone());

    Fmt::install(&configuration.verbosity)?;

    info!("Using node: {}", configuration.node.endpoint);

    let chain = RpcChainNode::connect(&configuration.node)
        .await
        .map_err(|e| Error::Execution(e.to_string()))?;
    let locator = IndexerClient::new(&configuration.indexer).map_err(|e| Error::Execution(e.to_string()))?;

    let explorer = Explorer::new(Arc::new(chain), Arc::new(locator), &configuration.balance);
    let session = match params.kind {
        Some(kind) => explorer.search_as(&params.input, kind.into()),
        None => explorer.search(&params.input),
    };

    let mut snapshot = session.settled().await;

    if let (Some(seconds), Some(block)) = (params.follow, &snapshot.block) {
        info!("Waiting up to {}s for the block following #{}", seconds, block.header.number);

        if tokio::time::timeout(Duration::from_secs(seconds), session.successor()).await.is_err() {
            info!("Next block was not produced within {}s", seconds);
        }
        snapshot = session.snapshot();
    }

    session.close();

    let output = serde_json::to_string_pretty(&snapshot).map_err(|e| Error::Execution(e.to_string()))?;
    println!("{}", output);

    match snapshot.status {
        ResolutionStatus::Failed(e) => Err(Error::Execution(e.to_string())),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use explorer_query::QueryKind;

    use super::KindArgument;

    #[test]
    fn kind_arguments_map_to_query_kinds() {
        assert_eq!(QueryKind::from(KindArgument::TransactionHash), QueryKind::TransactionHash);
        assert_eq!(QueryKind::from(KindArgument::CallData), QueryKind::CallData);
    }
}
