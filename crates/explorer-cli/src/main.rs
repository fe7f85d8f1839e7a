use clap::{Parser, Subcommand};

mod command;
pub mod core;

use crate::command::classify::{command_classify, ClassifyCommandParameters};
use crate::command::search::{command_search, SearchCommandParameters};
use crate::core::Error;

#[derive(Parser)]
#[command(name = "explorer-cli", about = "Query a Substrate chain the way a block explorer search box does")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Print how an input would be classified, without touching the network")]
    Classify(ClassifyCommandParameters),

    #[command(about = "Resolve an input to a block, transaction, account or call data")]
    Search(SearchCommandParameters),
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Classify(params) => command_classify(params)?,
        Commands::Search(params) => command_search(params).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Commands};
    use crate::command::search::KindArgument;

    #[test]
    fn search_flags_are_parsed() {
        let cli = Cli::try_parse_from(["explorer-cli", "search", "12345", "--kind", "block-number", "--follow", "30", "--node", "ws://node:9944"]).unwrap();

        let Commands::Search(params) = cli.command else {
            panic!("expected search");
        };
        assert_eq!(params.input, "12345");
        assert_eq!(params.kind, Some(KindArgument::BlockNumber));
        assert_eq!(params.follow, Some(30));
        assert_eq!(params.node.as_deref(), Some("ws://node:9944"));
        assert_eq!(params.indexer, None);
    }

    #[test]
    fn classify_requires_an_input() {
        assert!(Cli::try_parse_from(["explorer-cli", "classify"]).is_err());
    }
}
