use std::fmt;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Cancellation scope of one query session. Every asynchronous continuation that
/// writes session state checks its token first; cancelling the token turns every
/// pending completion of the session into a no-op.
#[derive(Clone)]
pub struct SessionToken {
    id: Uuid,
    token: CancellationToken,
}

impl SessionToken {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Scope nested in this one. It is cancelled with its parent but can be
    /// cancelled on its own without affecting the parent.
    pub fn child(&self) -> Self {
        Self {
            id: self.id,
            token: self.token.child_token(),
        }
    }

    /// Idempotent.
    pub fn cancel(&self) {
        self.token.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

impl Default for SessionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
