//! Per-operation cancellation and deadlines.
//!
//! Every event carries a [`Context`]. Repositories run their network I/O
//! through [`Context::run`], which abandons the future when the token is
//! cancelled or the deadline passes.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::CoreError;

/// Cancellation token plus optional deadline.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            timeout: None,
        }
    }

    /// A context cancelled together with `parent`.
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            deadline: None,
            timeout: None,
        }
    }

    /// Derive a context that additionally expires after `timeout`.
    ///
    /// An existing, earlier deadline is kept.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
            timeout: Some(timeout),
        }
    }

    /// Same cancellation, with the last timeout restarted from now.
    ///
    /// Long-lived handles opened under a context use this for each later
    /// operation so that the budget applies per call.
    pub fn renew(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.timeout.map(|timeout| Instant::now() + timeout),
            timeout: self.timeout,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Drive `fut` to completion unless the context is cancelled or its
    /// deadline passes first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, CoreError>
    where
        F: Future<Output = Result<T, CoreError>>,
    {
        if self.token.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => Err(CoreError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => {
                    Err(CoreError::Technical("operation timed out".to_string()))
                }
                res = fut => res,
            },
            None => tokio::select! {
                _ = self.token.cancelled() => Err(CoreError::Cancelled),
                res = fut => res,
            },
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}
