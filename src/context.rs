//! Execution context carried by requests: cancellation signals, deadlines,
//! and flattening of request-as-context chains.
//!
//! A parent request is routinely used as the execution context of a child
//! request, which nests [`Context::Request`] layers. Collaborators that need
//! the real context (the transport wiring up cancellation, in particular)
//! call [`Context::resolved`] to reach the innermost concrete value instead
//! of stacking wrappers that would defeat the cancellation primitive's own
//! propagation paths.

use std::future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// A concrete cancellation scope: a token plus an optional deadline.
///
/// Clones share cancellation state, so a scope handed to the transport can be
/// cancelled from any clone, concurrently, independent of the request that
/// carries it.
#[derive(Clone, Debug)]
pub struct Scope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Scope {
    fn new(deadline: Option<Instant>) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline,
        }
    }

    /// The underlying cancellation token.
    #[inline]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Completes when the scope is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

/// Execution context attached to every request.
#[derive(Clone, Debug, Default)]
pub enum Context {
    /// Process-wide default: never cancelled, no deadline.
    #[default]
    Background,
    /// A concrete cancellation scope.
    Scope(Scope),
    /// A request standing in as the context of a child request. Nesting
    /// requests nests this variant; [`Context::resolved`] flattens it.
    Request(Arc<Context>),
}

impl Context {
    #[inline]
    pub fn background() -> Self {
        Context::Background
    }

    /// A context with a fresh cancellation token and no deadline.
    pub fn cancellable() -> Self {
        Context::Scope(Scope::new(None))
    }

    /// A cancellable context that also expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Context::Scope(Scope::new(Some(deadline)))
    }

    /// A cancellable context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// The innermost context that is not a request wrapper.
    ///
    /// Walks [`Context::Request`] layers in O(depth) and returns the first
    /// non-request value, which may be the receiver itself. No side effects.
    pub fn resolved(&self) -> &Context {
        let mut ctx = self;
        while let Context::Request(inner) = ctx {
            ctx = inner;
        }
        ctx
    }

    /// Cancels the resolved scope; a no-op on a background context.
    pub fn cancel(&self) {
        if let Context::Scope(scope) = self.resolved() {
            scope.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self.resolved() {
            Context::Scope(scope) => scope.is_cancelled(),
            _ => false,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.resolved() {
            Context::Scope(scope) => scope.deadline(),
            _ => None,
        }
    }

    /// Completes on cancellation or deadline expiry; pends forever on a
    /// background context.
    pub async fn cancelled(&self) {
        match self.resolved() {
            Context::Scope(scope) => scope.cancelled().await,
            _ => future::pending::<()>().await,
        }
    }
}
