use std::fs;

use explorer_chain::Configuration as ChainConfiguration;
use explorer_indexer::{Configuration as IndexerConfiguration, GraphQLConfiguration};
use explorer_query::BalanceConfiguration;
use serde::{Deserialize, Serialize};

use crate::core::Error;

const ENVIRONMENT_PREFIX: &str = "EXPLORER_";
const DEFAULT_INDEXER_TIMEOUT: u64 = 10;
const DEFAULT_CACHE_VALIDITY: u64 = 60;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerbosityConfiguration {
    #[default]
    Info,
    Debug,
}

fn default_indexer() -> IndexerConfiguration {
    IndexerConfiguration::Disabled
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub verbosity: VerbosityConfiguration,

    #[serde(default)]
    pub node: ChainConfiguration,

    #[serde(default = "default_indexer")]
    pub indexer: IndexerConfiguration,

    #[serde(default)]
    pub balance: BalanceConfiguration,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            verbosity: VerbosityConfiguration::default(),
            node: ChainConfiguration::default(),
            indexer: default_indexer(),
            balance: BalanceConfiguration::default(),
        }
    }
}

impl Configuration {
    pub fn from_file(path: &str) -> Result<Self, Error> {
        let data = fs::read(path).map_err(|e| Error::Configuration(format!("could not read profile {}: {}", path, e)))?;

        serde_json::from_slice(&data).map_err(|e| Error::Configuration(format!("invalid profile {}: {}", path, e)))
    }

    /// Defaults, overridden by the profile if any, overridden by the environment
    pub fn load(profile: Option<&str>) -> Result<Self, Error> {
        let mut configuration = match profile {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        Environment::load()?.apply(&mut configuration);

        Ok(configuration)
    }

    pub fn with_node(mut self, endpoint: Option<String>) -> Self {
        if let Some(endpoint) = endpoint {
            self.node.endpoint = endpoint;
        }
        self
    }

    pub fn with_indexer(mut self, endpoint: Option<String>) -> Self {
        if let Some(endpoint) = endpoint {
            self.set_indexer_endpoint(endpoint);
        }
        self
    }

    fn set_indexer_endpoint(&mut self, endpoint: String) {
        match &mut self.indexer {
            IndexerConfiguration::GraphQL(configuration) => configuration.endpoint = endpoint,
            indexer => {
                *indexer = IndexerConfiguration::GraphQL(GraphQLConfiguration {
                    endpoint,
                    timeout: DEFAULT_INDEXER_TIMEOUT,
                    cache_validity: DEFAULT_CACHE_VALIDITY,
                })
            },
        }
    }

    fn set_indexer_timeout(&mut self, timeout: u64) {
        if let IndexerConfiguration::GraphQL(configuration) = &mut self.indexer {
            configuration.timeout = timeout;
        }
    }
}

/// `EXPLORER_*` variables
#[derive(Debug, Default, Deserialize)]
struct Environment {
    node_endpoint: Option<String>,
    node_timeout: Option<u64>,
    indexer_endpoint: Option<String>,
    indexer_timeout: Option<u64>,
    decimals: Option<u32>,
    unit: Option<String>,
    verbosity: Option<VerbosityConfiguration>,
}

impl Environment {
    fn load() -> Result<Self, Error> {
        envy::prefixed(ENVIRONMENT_PREFIX)
            .from_env::<Self>()
            .map_err(|e| Error::Configuration(e.to_string()))
    }

    fn apply(self, configuration: &mut Configuration) {
        if let Some(endpoint) = self.node_endpoint {
            configuration.node.endpoint = endpoint;
        }
        if let Some(timeout) = self.node_timeout {
            configuration.node.timeout = timeout;
        }
        if let Some(endpoint) = self.indexer_endpoint {
            configuration.set_indexer_endpoint(endpoint);
        }
        if let Some(timeout) = self.indexer_timeout {
            configuration.set_indexer_timeout(timeout);
        }
        if let Some(decimals) = self.decimals {
            configuration.balance.decimals = decimals;
        }
        if let Some(unit) = self.unit {
            configuration.balance.unit = Some(unit);
        }
        if let Some(verbosity) = self.verbosity {
            configuration.verbosity = verbosity;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use explorer_indexer::Configuration as IndexerConfiguration;
    use serde_json::json;

    use super::*;

    fn environment(variables: &[(&str, &str)]) -> Environment {
        envy::prefixed(ENVIRONMENT_PREFIX)
            .from_iter(variables.iter().map(|(k, v)| (k.to_string(), v.to_string())))
            .unwrap()
    }

    #[test]
    fn defaults_point_to_a_local_node_without_indexer() {
        let configuration = Configuration::default();

        assert_eq!(configuration.node.endpoint, explorer_chain::DEFAULT_NODE_ENDPOINT);
        assert!(matches!(configuration.indexer, IndexerConfiguration::Disabled));
        assert_eq!(configuration.verbosity, VerbosityConfiguration::Info);
    }

    #[test]
    fn partial_profile_keeps_defaults() {
        // Given
        let path = std::env::temp_dir().join(format!("explorer-profile-{}.json", std::process::id()));
        fs::write(
            &path,
            json!({
                "indexer": { "provider": "graphql", "endpoint": "http://indexer/graphql", "timeout": 3 },
                "balance": { "decimals": 10, "unit": "DOT" }
            })
            .to_string(),
        )
        .unwrap();

        // When
        let configuration = Configuration::from_file(path.to_str().unwrap()).unwrap();
        fs::remove_file(&path).unwrap();

        // Then
        assert_eq!(configuration.node.endpoint, explorer_chain::DEFAULT_NODE_ENDPOINT);
        let IndexerConfiguration::GraphQL(indexer) = configuration.indexer else {
            panic!("expected a graphql indexer");
        };
        assert_eq!(indexer.endpoint, "http://indexer/graphql");
        assert_eq!(indexer.cache_validity, 60);
        assert_eq!(configuration.balance.decimals, 10);
    }

    #[test]
    fn missing_profile_is_a_configuration_error() {
        let result = Configuration::from_file("/nonexistent/explorer-profile.json");

        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn environment_overrides_the_profile() {
        // Given
        let mut configuration = Configuration::default();

        // When
        environment(&[
            ("EXPLORER_NODE_ENDPOINT", "ws://node:9944"),
            ("EXPLORER_INDEXER_ENDPOINT", "http://indexer/graphql"),
            ("EXPLORER_INDEXER_TIMEOUT", "2"),
            ("EXPLORER_DECIMALS", "10"),
            ("EXPLORER_VERBOSITY", "debug"),
            ("UNRELATED", "value"),
        ])
        .apply(&mut configuration);

        // Then
        assert_eq!(configuration.node.endpoint, "ws://node:9944");
        assert_eq!(configuration.balance.decimals, 10);
        assert_eq!(configuration.verbosity, VerbosityConfiguration::Debug);
        let IndexerConfiguration::GraphQL(indexer) = configuration.indexer else {
            panic!("expected a graphql indexer");
        };
        assert_eq!(indexer.timeout, 2);
    }

    #[test]
    fn flags_override_everything() {
        let configuration = Configuration::default()
            .with_node(Some("ws://flag:9944".to_string()))
            .with_indexer(Some("http://flag/graphql".to_string()))
            .with_node(None);

        assert_eq!(configuration.node.endpoint, "ws://flag:9944");
        assert!(matches!(configuration.indexer, IndexerConfiguration::GraphQL(x) if x.endpoint == "http://flag/graphql"));
    }
}
