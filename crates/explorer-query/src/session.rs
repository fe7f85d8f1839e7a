use std::sync::{Arc, Mutex, PoisonError};

use explorer_chain::{BlockIdentifier, BlockNumber, ChainNode, Hash};
use explorer_common::session::SessionToken;
use explorer_indexer::TransactionLocator;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::classifier::{classify, QueryClassification, QueryClassifier, QueryKind};
use crate::decoder::{BalanceConfiguration, DecodedTransaction, ExtrinsicDecoder};
use crate::resolver::{BlockRecord, BlockResolver, LocatedTransaction};
use crate::tracker::{NextBlockTracker, TrackerState};
use crate::Error;

/// What a query designates once classified
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum QueryTarget {
    None,
    Block(BlockIdentifier),
    Transaction(Hash),
    Account(String),
    CallData(String),
}

impl QueryTarget {
    fn new(raw: &str, kind: QueryKind) -> Result<Self, Error> {
        let value = raw.trim();
        if value.is_empty() {
            return Ok(Self::None);
        }

        match kind {
            QueryKind::BlockHash => Hash::parse(value)
                .map(|x| Self::Block(BlockIdentifier::Hash(x)))
                .map_err(|_| Error::InvalidQuery(format!("{} is not a block hash", value))),
            QueryKind::BlockNumber => value
                .parse::<BlockNumber>()
                .map(|x| Self::Block(BlockIdentifier::Number(x)))
                .map_err(|_| Error::InvalidQuery(format!("{} is not a block number", value))),
            QueryKind::TransactionHash => Hash::parse(value)
                .map(Self::Transaction)
                .map_err(|_| Error::InvalidQuery(format!("{} is not a transaction hash", value))),
            QueryKind::Address => Ok(Self::Account(value.to_string())),
            QueryKind::CallData => Ok(Self::CallData(value.to_string())),
        }
    }

    fn needs_resolution(&self) -> bool {
        matches!(self, Self::Block(_) | Self::Transaction(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum ResolutionStatus {
    Idle,
    Resolving,
    Resolved,
    Failed(Error),
}

/// Everything a consumer needs to render a query session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub input: String,
    pub classification: QueryClassification,
    pub target: QueryTarget,
    pub status: ResolutionStatus,

    pub block: Option<BlockRecord>,
    pub transaction: Option<DecodedTransaction>,

    /// Position of the transaction in `block`
    pub extrinsic_index: Option<usize>,

    pub successor: Option<Hash>,
    pub successor_error: Option<Error>,
}

impl SessionSnapshot {
    fn new(input: &str, classification: QueryClassification) -> Self {
        Self {
            input: input.to_string(),
            classification,
            target: QueryTarget::None,
            status: ResolutionStatus::Idle,
            block: None,
            transaction: None,
            extrinsic_index: None,
            successor: None,
            successor_error: None,
        }
    }

    /// No refinement nor resolution is running anymore
    pub fn is_settled(&self) -> bool {
        !self.classification.refinement_pending && self.status != ResolutionStatus::Resolving
    }

    fn clear_resolution(&mut self) {
        self.block = None;
        self.transaction = None;
        self.extrinsic_index = None;
        self.successor = None;
        self.successor_error = None;
    }
}

enum Resolution {
    Block(BlockRecord),
    Transaction(LocatedTransaction, DecodedTransaction),
}

impl Resolution {
    fn block_number(&self) -> BlockNumber {
        match self {
            Self::Block(record) => record.header.number,
            Self::Transaction(located, _) => located.block().header.number,
        }
    }
}

struct Engine {
    chain: Arc<dyn ChainNode>,
    locator: Arc<dyn TransactionLocator>,
    classifier: QueryClassifier,
    resolver: BlockResolver,
    decoder: ExtrinsicDecoder,
}

impl Engine {
    async fn resolve(&self, target: &QueryTarget) -> Result<Resolution, Error> {
        match target {
            QueryTarget::Block(id) => Ok(Resolution::Block(self.resolver.resolve(id).await?)),
            QueryTarget::Transaction(tx_hash) => {
                let number = self.locator.locate(tx_hash.as_str()).await?;
                let located = self.resolver.resolve_transaction(&BlockIdentifier::Number(number), tx_hash).await?;
                let decoded = self.decoder.decode(located.extrinsic());

                Ok(Resolution::Transaction(located, decoded))
            },
            target => Err(Error::InvalidQuery(format!("{:?} cannot be resolved", target))),
        }
    }
}

/// State shared between a session and the tasks working for it. Every write goes
/// through [`SessionContext::update`] with the token of the writer, so writes of
/// cancelled work are dropped.
struct SessionContext {
    engine: Arc<Engine>,
    token: SessionToken,
    resolution: Mutex<SessionToken>,
    state: watch::Sender<SessionSnapshot>,
    tracker: NextBlockTracker,

    /// Failure of a resolution that finished while the classification was still being
    /// refined. Only accessed from within a state write.
    held: Mutex<Option<(SessionToken, Error)>>,
}

impl SessionContext {
    fn update(&self, token: &SessionToken, change: impl FnOnce(&mut SessionSnapshot)) -> bool {
        self.state.send_if_modified(|snapshot| {
            if token.is_cancelled() {
                return false;
            }
            change(snapshot);
            true
        })
    }

    /// Replaces any running resolution by one of `target`. `prepare` is applied to the
    /// snapshot in the same write that resets it.
    fn start_resolution(self: &Arc<Self>, target: QueryTarget, prepare: impl FnOnce(&mut SessionSnapshot)) {
        let token = {
            let mut current = self.resolution.lock().unwrap_or_else(PoisonError::into_inner);
            current.cancel();
            *current = self.token.child();
            current.clone()
        };
        self.tracker.cancel();

        self.update(&token, |snapshot| {
            prepare(snapshot);
            snapshot.clear_resolution();
            snapshot.target = target.clone();
            snapshot.status = ResolutionStatus::Resolving;
        });

        let context = self.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => return,
                result = context.engine.resolve(&target) => result,
            };

            context.complete(&token, result);
        });
    }

    fn complete(self: &Arc<Self>, token: &SessionToken, result: Result<Resolution, Error>) {
        let number = result.as_ref().ok().map(Resolution::block_number);

        let applied = self.update(token, |snapshot| match result {
            Ok(Resolution::Block(record)) => {
                snapshot.block = Some(record);
                snapshot.status = ResolutionStatus::Resolved;
            },
            Ok(Resolution::Transaction(located, decoded)) => {
                snapshot.extrinsic_index = Some(located.index());
                snapshot.transaction = Some(decoded);
                snapshot.block = Some(located.into_block());
                snapshot.status = ResolutionStatus::Resolved;
            },
            Err(e) if snapshot.classification.refinement_pending => {
                debug!(message = "query resolution failed while refining, holding the failure back", input = %snapshot.input, error = %e);
                *self.held.lock().unwrap_or_else(PoisonError::into_inner) = Some((token.clone(), e));
            },
            Err(e) => Self::fail(snapshot, e),
        });

        if let (true, Some(number)) = (applied, number) {
            self.follow(token, number);
        }
    }

    fn fail(snapshot: &mut SessionSnapshot, e: Error) {
        warn!(message = "query resolution failed", input = %snapshot.input, error = %e);
        snapshot.clear_resolution();
        snapshot.status = ResolutionStatus::Failed(e);
    }

    /// Tracks the successor of block `number` on behalf of the resolution owning `token`
    fn follow(self: &Arc<Self>, token: &SessionToken, number: BlockNumber) {
        if token.is_cancelled() {
            return;
        }

        let context = self.clone();
        let resolution = token.clone();
        let handle = self.tracker.track(number, move |hash| {
            context.update(&resolution, |snapshot| snapshot.successor = Some(hash));
        });

        let context = self.clone();
        let resolution = token.clone();
        tokio::spawn(async move {
            if let TrackerState::Failed(e) = handle.settled().await {
                context.update(&resolution, |snapshot| snapshot.successor_error = Some(e));
            }
        });
    }

    fn refine(self: &Arc<Self>, raw: &str) {
        let context = self.clone();
        let Some(refinement) = self.engine.classifier.refine(raw, self.token.clone(), move |kind| context.refined(kind)) else {
            return;
        };

        let context = self.clone();
        tokio::spawn(async move {
            let _ = refinement.await;
            context.update(&context.token, |snapshot| {
                snapshot.classification.refinement_pending = false;

                let held = context.held.lock().unwrap_or_else(PoisonError::into_inner).take();
                if let Some((_, e)) = held.filter(|(resolution, _)| !resolution.is_cancelled()) {
                    Self::fail(snapshot, e);
                }
            });
        });
    }

    fn refined(self: &Arc<Self>, kind: QueryKind) {
        info!(message = "query refined", session = %self.token.id(), kind = ?kind);

        if kind != QueryKind::TransactionHash {
            self.update(&self.token, |snapshot| snapshot.classification = QueryClassification::settled(kind));
            return;
        }

        let input = self.state.borrow().input.clone();
        if let Ok(tx_hash) = Hash::parse(input.trim()) {
            self.start_resolution(QueryTarget::Transaction(tx_hash), |snapshot| {
                snapshot.classification = QueryClassification::settled(QueryKind::TransactionHash)
            });
        }
    }

    /// Idempotent.
    fn close(&self) {
        self.token.cancel();
        self.tracker.cancel();
    }
}

struct SessionGuard(Arc<SessionContext>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Consumer side of one query. Clones observe the same session, which is closed
/// once every clone is dropped.
#[derive(Clone)]
pub struct QuerySession {
    context: Arc<SessionContext>,
    _guard: Arc<SessionGuard>,
}

impl QuerySession {
    fn new(context: Arc<SessionContext>) -> Self {
        Self {
            _guard: Arc::new(SessionGuard(context.clone())),
            context,
        }
    }

    pub fn id(&self) -> Uuid {
        self.context.token.id()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.context.state.borrow().clone()
    }

    /// Receiver notified on every change of the session state
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.context.state.subscribe()
    }

    /// Waits until the classification and the resolution are both final
    pub async fn settled(&self) -> SessionSnapshot {
        self.wait_for(SessionSnapshot::is_settled).await
    }

    /// Waits for the hash of the block following the resolved one. `None` when nothing was
    /// resolved, the successor could not be tracked or the session was closed.
    pub async fn successor(&self) -> Option<Hash> {
        self.wait_for(|x| x.successor.is_some() || x.successor_error.is_some() || (x.is_settled() && x.block.is_none()))
            .await
            .successor
    }

    /// Waits until `condition` holds or the session is closed, and returns the state at that point
    pub async fn wait_for(&self, mut condition: impl FnMut(&SessionSnapshot) -> bool) -> SessionSnapshot {
        let mut receiver = self.subscribe();

        tokio::select! {
            result = receiver.wait_for(|x| condition(x)) => match result {
                Ok(snapshot) => (*snapshot).clone(),
                Err(_) => self.snapshot(),
            },
            _ = self.context.token.cancelled() => self.snapshot(),
        }
    }

    /// Cancels every task of the session and closes its subscription. Idempotent.
    pub fn close(&self) {
        self.context.close();
    }

    pub fn is_closed(&self) -> bool {
        self.context.token.is_cancelled()
    }
}

/// Entry point of the query engine. At most one session is live at a time, starting
/// a search closes the previous one.
pub struct Explorer {
    engine: Arc<Engine>,
    active: Mutex<Option<Arc<SessionContext>>>,
}

impl Explorer {
    pub fn new(chain: Arc<dyn ChainNode>, locator: Arc<dyn TransactionLocator>, balance: &BalanceConfiguration) -> Self {
        let engine = Engine {
            classifier: QueryClassifier::new(chain.clone(), locator.clone()),
            resolver: BlockResolver::new(chain.clone()),
            decoder: ExtrinsicDecoder::new(balance),
            chain,
            locator,
        };

        Self {
            engine: Arc::new(engine),
            active: Mutex::new(None),
        }
    }

    /// Classifies `raw` and starts resolving it. Must be called from within a Tokio runtime.
    #[instrument(name = "search", skip(self))]
    pub fn search(&self, raw: &str) -> QuerySession {
        self.open(raw, classify(raw))
    }

    /// Same as [`Explorer::search`] with the kind of the query given by the caller
    #[instrument(name = "search_as", skip(self))]
    pub fn search_as(&self, raw: &str, kind: QueryKind) -> QuerySession {
        self.open(raw, QueryClassification::settled(kind))
    }

    /// Closes the live session, if any
    pub fn close(&self) {
        if let Some(previous) = self.active.lock().unwrap_or_else(PoisonError::into_inner).take() {
            previous.close();
        }
    }

    fn open(&self, raw: &str, classification: QueryClassification) -> QuerySession {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.take() {
            previous.close();
        }

        let token = SessionToken::new();
        let (state, _) = watch::channel(SessionSnapshot::new(raw, classification));
        let context = Arc::new(SessionContext {
            engine: self.engine.clone(),
            resolution: Mutex::new(token.child()),
            token,
            state,
            tracker: NextBlockTracker::new(self.engine.chain.clone()),
            held: Mutex::new(None),
        });

        info!(message = "query session opened", session = %context.token.id(), kind = ?classification.kind, refinement_pending = classification.refinement_pending);

        match QueryTarget::new(raw, classification.kind) {
            Ok(target) if target.needs_resolution() => context.start_resolution(target, |_| {}),
            Ok(target) => {
                let status = match target {
                    QueryTarget::None => ResolutionStatus::Idle,
                    _ => ResolutionStatus::Resolved,
                };
                context.update(&context.token, |snapshot| {
                    snapshot.target = target;
                    snapshot.status = status;
                });
            },
            Err(e) => {
                context.update(&context.token, |snapshot| snapshot.status = ResolutionStatus::Failed(e));
            },
        }

        if classification.refinement_pending {
            context.refine(raw);
        }

        *active = Some(context.clone());
        QuerySession::new(context)
    }
}

impl Drop for Explorer {
    fn drop(&mut self) {
        self.close();
    }
}
