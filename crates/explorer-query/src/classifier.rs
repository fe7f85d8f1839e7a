use std::sync::Arc;

use explorer_chain::{ChainNode, Hash};
use explorer_common::session::SessionToken;
use explorer_indexer::TransactionLocator;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

/// Decimal inputs at or above this value are not treated as block numbers
pub const MAX_BLOCK_NUMBER: u64 = 5_000_000_000;

lazy_static! {
    static ref IS_HASH: Regex = Regex::new(r"^0x[0-9a-fA-F]{64}$").expect("invalid regex");
    static ref IS_HEX: Regex = Regex::new(r"^(0x)?([0-9a-fA-F]+)$").expect("invalid regex");
    static ref IS_DECIMAL: Regex = Regex::new(r"^[0-9]+$").expect("invalid regex");
    static ref IS_ADDRESS: Regex = Regex::new(r"^[15][1-9A-HJ-NP-Za-km-z]{0,47}$").expect("invalid regex");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    BlockHash,
    BlockNumber,
    TransactionHash,
    Address,
    CallData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueryClassification {
    pub kind: QueryKind,

    /// Set when the input is a 32 byte hash that may name a block or a transaction
    pub refinement_pending: bool,
}

impl QueryClassification {
    pub fn settled(kind: QueryKind) -> Self {
        Self {
            kind,
            refinement_pending: false,
        }
    }

    fn pending(kind: QueryKind) -> Self {
        Self {
            kind,
            refinement_pending: true,
        }
    }
}

/// Classifies `raw` from its shape alone. Rules are applied in order, the first match wins:
///
/// 1. `0x` followed by 64 hex digits is a block hash pending refinement
/// 2. hex of odd length (prefixed, or containing a letter) is call data
/// 3. decimal strictly between 0 and [`MAX_BLOCK_NUMBER`] is a block number, any other decimal a block hash
/// 4. base58 starting with `1` or `5`, at most 48 characters, is an address
/// 5. anything else is a block hash
pub fn classify(raw: &str) -> QueryClassification {
    let value = raw.trim();

    if IS_HASH.is_match(value) {
        return QueryClassification::pending(QueryKind::BlockHash);
    }

    if is_call_data(value) {
        return QueryClassification::settled(QueryKind::CallData);
    }

    if IS_DECIMAL.is_match(value) {
        return match value.parse::<u64>() {
            Ok(number) if number > 0 && number < MAX_BLOCK_NUMBER => QueryClassification::settled(QueryKind::BlockNumber),
            _ => QueryClassification::settled(QueryKind::BlockHash),
        };
    }

    if IS_ADDRESS.is_match(value) {
        return QueryClassification::settled(QueryKind::Address);
    }

    QueryClassification::settled(QueryKind::BlockHash)
}

fn is_call_data(value: &str) -> bool {
    let Some(captures) = IS_HEX.captures(value) else {
        return false;
    };

    let prefixed = captures.get(1).is_some();
    let digits = &captures[2];

    digits.len() % 2 == 1 && (prefixed || !digits.bytes().all(|x| x.is_ascii_digit()))
}

/// Resolves the block hash / transaction hash ambiguity of 32 byte hashes by probing
/// the chain first and the transaction index second.
#[derive(Clone)]
pub struct QueryClassifier {
    chain: Arc<dyn ChainNode>,
    locator: Arc<dyn TransactionLocator>,
}

impl QueryClassifier {
    pub fn new(chain: Arc<dyn ChainNode>, locator: Arc<dyn TransactionLocator>) -> Self {
        Self { chain, locator }
    }

    pub fn classify(&self, raw: &str) -> QueryClassification {
        classify(raw)
    }

    /// Probes `raw` once against each source. Answers `None` when the input is not
    /// ambiguous or when neither source recognizes it.
    #[instrument(name = "disambiguate", skip(self))]
    pub async fn disambiguate(&self, raw: &str) -> Option<QueryKind> {
        if !classify(raw).refinement_pending {
            return None;
        }

        let hash = Hash::parse(raw.trim()).ok()?;

        match self.chain.header(&hash).await {
            Ok(Some(_)) => return Some(QueryKind::BlockHash),
            Ok(None) => {},
            Err(e) => debug!(message = "header probe failed", error = %e),
        }

        match self.locator.locate(hash.as_str()).await {
            Ok(_) => Some(QueryKind::TransactionHash),
            Err(e) => {
                debug!(message = "transaction probe failed", error = %e);
                None
            },
        }
    }

    /// Runs [`QueryClassifier::disambiguate`] in the background. `on_resolved` is invoked at
    /// most once, and never once `token` is cancelled. Returns `None` when `raw` needs no refinement.
    pub fn refine<F>(&self, raw: &str, token: SessionToken, on_resolved: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce(QueryKind) + Send + 'static,
    {
        if !classify(raw).refinement_pending {
            return None;
        }

        let classifier = self.clone();
        let raw = raw.to_string();

        Some(tokio::spawn(async move {
            let kind = tokio::select! {
                _ = token.cancelled() => return,
                kind = classifier.disambiguate(&raw) => kind,
            };

            if let Some(kind) = kind {
                if !token.is_cancelled() {
                    on_resolved(kind)
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use explorer_chain::testing::{self, Failure, MockChainNode};
    use explorer_common::session::SessionToken;
    use explorer_indexer::mock::MockTransactionLocator;
    use tokio::sync::oneshot;

    use super::*;

    fn kind(raw: &str) -> QueryKind {
        classify(raw).kind
    }

    #[test]
    fn full_hash_is_a_block_hash_pending_refinement() {
        let classification = classify(&format!("0x{}", "ab".repeat(32)));

        assert_eq!(classification.kind, QueryKind::BlockHash);
        assert!(classification.refinement_pending);
    }

    #[test]
    fn decimal_in_range_is_a_block_number() {
        assert_eq!(kind("12345"), QueryKind::BlockNumber);
        assert_eq!(kind("1"), QueryKind::BlockNumber);
        assert_eq!(kind("4999999999"), QueryKind::BlockNumber);
        assert!(!classify("12345").refinement_pending);
    }

    #[test]
    fn decimal_out_of_range_is_a_block_hash() {
        assert_eq!(kind("0"), QueryKind::BlockHash);
        assert_eq!(kind("5000000000"), QueryKind::BlockHash);
        assert_eq!(kind("99999999999999999999999"), QueryKind::BlockHash);
    }

    #[test]
    fn odd_length_hex_is_call_data() {
        assert_eq!(kind("0xabc"), QueryKind::CallData);
        assert_eq!(kind("0x123"), QueryKind::CallData);
        assert_eq!(kind("abcde"), QueryKind::CallData);
        assert_eq!(kind(&format!("0x{}", "a".repeat(65))), QueryKind::CallData);
    }

    #[test]
    fn even_length_hex_that_is_not_a_hash_is_a_block_hash() {
        assert_eq!(kind("0xabcd"), QueryKind::BlockHash);
        assert!(!classify("0xabcd").refinement_pending);
    }

    #[test]
    fn base58_starting_with_1_or_5_is_an_address() {
        assert_eq!(kind("5GNJqTPyNqANBkUVMN1LPPrxXnFouWXoe2wNSmmEoLctxiZY"), QueryKind::Address);
        assert_eq!(kind("1FRMM8PEiWXYax7rpS6X4XZX1aAAxSWx1CrKTyrVYhV24fg"), QueryKind::Address);
    }

    #[test]
    fn too_long_or_wrongly_prefixed_base58_is_a_block_hash() {
        assert_eq!(kind(&format!("5{}", "G".repeat(48))), QueryKind::BlockHash);
        assert_eq!(kind("7GNJqTPyNqANBkUVMN1LPPrxXnFouWXoe2wNSmmEoLctxiZY"), QueryKind::BlockHash);
        assert_eq!(kind("5GNJ0TPy"), QueryKind::BlockHash);
        assert_eq!(kind(&format!("0{}", "G".repeat(47))), QueryKind::BlockHash);
    }

    #[test]
    fn anything_else_is_a_block_hash() {
        assert_eq!(kind("hello world"), QueryKind::BlockHash);
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(kind("  12345\n"), QueryKind::BlockNumber);
    }

    fn classifier(chain: MockChainNode, locator: MockTransactionLocator) -> (QueryClassifier, Arc<MockChainNode>, Arc<MockTransactionLocator>) {
        let chain = Arc::new(chain);
        let locator = Arc::new(locator);

        (QueryClassifier::new(chain.clone(), locator.clone()), chain, locator)
    }

    #[tokio::test]
    async fn known_block_hash_is_confirmed_without_asking_the_indexer() {
        // Given
        let (classifier, chain, locator) = classifier(MockChainNode::new().with_block(testing::block(10, vec![])), MockTransactionLocator::new());

        // When
        let kind = classifier.disambiguate(testing::block_hash(10).as_str()).await;

        // Then
        assert_eq!(kind, Some(QueryKind::BlockHash));
        assert_eq!(chain.calls("header"), 1);
        assert_eq!(locator.calls(), 0);
    }

    #[tokio::test]
    async fn indexed_transaction_hash_is_reported() {
        let tx_hash = testing::extrinsic_hash(10, 1);
        let (classifier, chain, locator) = classifier(MockChainNode::new(), MockTransactionLocator::new().with_transaction(tx_hash.as_str(), 10));

        let kind = classifier.disambiguate(tx_hash.as_str()).await;

        assert_eq!(kind, Some(QueryKind::TransactionHash));
        assert_eq!(chain.calls("header"), 1);
        assert_eq!(locator.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_hash_stays_unresolved_and_each_probe_runs_once() {
        // Given
        let (classifier, chain, locator) = classifier(MockChainNode::new().with_failure(Failure::Header), MockTransactionLocator::unavailable());

        // When
        let kind = classifier.disambiguate(testing::hash(77).as_str()).await;

        // Then
        assert_eq!(kind, None);
        assert_eq!(chain.calls("header"), 1);
        assert_eq!(locator.calls(), 1);
    }

    #[tokio::test]
    async fn unambiguous_input_is_not_probed() {
        let (classifier, chain, locator) = classifier(MockChainNode::new(), MockTransactionLocator::new());

        assert_eq!(classifier.disambiguate("12345").await, None);
        assert!(classifier.refine("12345", SessionToken::new(), |_| {}).is_none());
        assert_eq!(chain.calls("header"), 0);
        assert_eq!(locator.calls(), 0);
    }

    #[tokio::test]
    async fn refine_reports_the_refined_kind() {
        // Given
        let tx_hash = testing::extrinsic_hash(3, 0);
        let (classifier, _, _) = classifier(MockChainNode::new(), MockTransactionLocator::new().with_transaction(tx_hash.as_str(), 3));
        let (sender, receiver) = oneshot::channel();

        // When
        let handle = classifier
            .refine(tx_hash.as_str(), SessionToken::new(), move |kind| {
                let _ = sender.send(kind);
            })
            .unwrap();
        handle.await.unwrap();

        // Then
        assert_eq!(receiver.await.unwrap(), QueryKind::TransactionHash);
    }

    #[tokio::test]
    async fn cancelled_refinement_never_calls_back() {
        // Given
        let tx_hash = testing::extrinsic_hash(3, 0);
        let (classifier, _, _) = classifier(
            MockChainNode::new().with_latency(Duration::from_millis(50)),
            MockTransactionLocator::new().with_transaction(tx_hash.as_str(), 3),
        );
        let token = SessionToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        // When
        let counter = calls.clone();
        let handle = classifier
            .refine(tx_hash.as_str(), token.clone(), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        token.cancel();
        handle.await.unwrap();

        // Then
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
