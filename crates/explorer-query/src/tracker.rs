use std::sync::{Arc, Mutex, PoisonError};

use explorer_chain::{BlockNumber, ChainNode, Hash};
use explorer_common::session::SessionToken;
use explorer_common::{measure_duration, metric};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum TrackerState {
    Idle,
    DirectLookupPending,
    SubscriptionPending,
    Resolved(Hash),
    Cancelled,
    Failed(Error),
}

impl TrackerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved(_) | Self::Cancelled | Self::Failed(_))
    }
}

/// Control over one running tracker. Clones share the same tracker.
#[derive(Clone)]
pub struct TrackerHandle {
    target: BlockNumber,
    token: SessionToken,
    state: Arc<watch::Sender<TrackerState>>,
    task: AbortHandle,
}

impl TrackerHandle {
    /// Number of the block being waited for
    pub fn target(&self) -> BlockNumber {
        self.target
    }

    pub fn state(&self) -> TrackerState {
        self.state.borrow().clone()
    }

    /// Stops the tracker and closes its subscription, if any. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();

        self.task.abort();

        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            *state = TrackerState::Cancelled;
            true
        });
    }

    /// Waits until the tracker resolves, fails or is cancelled
    pub async fn settled(&self) -> TrackerState {
        self.wait_for(TrackerState::is_terminal).await
    }

    pub async fn wait_for(&self, mut condition: impl FnMut(&TrackerState) -> bool) -> TrackerState {
        let mut receiver = self.state.subscribe();
        let result = receiver.wait_for(|x| condition(x)).await.map(|x| (*x).clone());

        result.unwrap_or_else(|_| self.state())
    }
}

/// Discovers the hash of the block following a given one. The block may not exist yet, in
/// which case a new heads subscription is held open until it is produced.
pub struct NextBlockTracker {
    chain: Arc<dyn ChainNode>,
    current: Mutex<Option<TrackerHandle>>,
}

impl NextBlockTracker {
    pub fn new(chain: Arc<dyn ChainNode>) -> Self {
        Self {
            chain,
            current: Mutex::new(None),
        }
    }

    /// Starts looking for the successor of block `number`, cancelling the previous tracker.
    /// `on_resolved` is called at most once, and never after the tracker is cancelled.
    pub fn track<F>(&self, number: BlockNumber, on_resolved: F) -> TrackerHandle
    where
        F: FnOnce(Hash) + Send + 'static,
    {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = current.take() {
            previous.cancel();
        }

        let target = number.saturating_add(1);
        let token = SessionToken::new();
        let (sender, _) = watch::channel(TrackerState::Idle);
        let state = Arc::new(sender);

        let task = tokio::spawn(run(self.chain.clone(), target, token.clone(), state.clone(), on_resolved));

        let handle = TrackerHandle {
            target,
            token,
            state,
            task: task.abort_handle(),
        };
        *current = Some(handle.clone());

        handle
    }

    /// Cancels the running tracker, if any. Idempotent.
    pub fn cancel(&self) {
        if let Some(handle) = self.current.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.cancel();
        }
    }
}

impl Drop for NextBlockTracker {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run<F>(chain: Arc<dyn ChainNode>, target: BlockNumber, token: SessionToken, state: Arc<watch::Sender<TrackerState>>, on_resolved: F)
where
    F: FnOnce(Hash) + Send + 'static,
{
    let transition = |next: TrackerState| {
        state.send_if_modified(|current| {
            if current.is_terminal() || token.is_cancelled() {
                return false;
            }
            *current = next;
            true
        })
    };

    let (result, duration) = measure_duration!(tokio::select! {
        _ = token.cancelled() => return,
        result = follow(chain.as_ref(), target, &transition) => result,
    });

    metric!(histogram[next_block_wait_milliseconds] = duration.as_millis(), number = target);
    metric!(on error result => counter [ next_block_error ] = 1, number = target);

    match result {
        Ok(hash) => {
            if transition(TrackerState::Resolved(hash.clone())) {
                info!(message = "next block found", number = target, hash = %hash);
                on_resolved(hash);
            }
        },
        Err(e) => {
            warn!(message = "could not find next block", number = target, error = %e);
            transition(TrackerState::Failed(e));
        },
    }
}

async fn follow(chain: &dyn ChainNode, target: BlockNumber, transition: &impl Fn(TrackerState) -> bool) -> Result<Hash, Error> {
    transition(TrackerState::DirectLookupPending);

    if let Some(hash) = lookup(chain, target).await? {
        return Ok(hash);
    }

    transition(TrackerState::SubscriptionPending);
    debug!(message = "next block not produced yet, waiting for it", number = target);

    // Dropping the stream on return closes the subscription
    let mut heads = chain.subscribe_new_heads().await.map_err(|e| Error::Subscription(e.to_string()))?;

    while let Some(item) = heads.next().await {
        let header = match item {
            Ok(header) => header,
            Err(e) => {
                warn!(message = "skipping unreadable head", error = %e);
                continue;
            },
        };

        if header.number == target {
            return Ok(header.hash);
        }

        // The block was produced between the lookup and the subscription
        if header.number > target {
            if let Some(hash) = lookup(chain, target).await? {
                return Ok(hash);
            }
        }
    }

    Err(Error::Subscription(format!("new heads subscription closed before block #{} was produced", target)))
}

async fn lookup(chain: &dyn ChainNode, number: BlockNumber) -> Result<Option<Hash>, Error> {
    chain
        .block_hash(number)
        .await
        .map_err(|e| Error::BlockFetchFailed(format!("could not get hash of block #{}: {}", number, e)))
}
