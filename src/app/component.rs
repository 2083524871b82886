use super::{ComponentStates, ShutdownHandle};
use crate::error::{AppError, Result};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// A long-running unit managed by [`App`](super::App).
///
/// `start` is called exactly once per run, concurrently with the other
/// components. It may either spawn background work and return quickly, or
/// block until the [`RunContext`] is cancelled and then return `Ok(())`.
/// Both styles count as a successful start.
///
/// `stop` is called at most once, in reverse registration order, and must
/// return promptly once the [`ShutdownContext`] deadline has passed. It must be
/// safe to call when `start` never completed or failed.
#[async_trait::async_trait]
pub trait Component: Send + Sync {
    /// Stable identifier used for logging
    fn name(&self) -> &str;

    /// Begin the component's work
    async fn start(&self, ctx: RunContext) -> Result<()>;

    /// Request termination and wait until stopped or the deadline elapses
    async fn stop(&self, ctx: &ShutdownContext) -> Result<()>;
}

/// Context handed to [`Component::start`], cancelled when the application
/// leaves its running state or a sibling fails to start.
#[derive(Clone)]
pub struct RunContext {
    token: CancellationToken,
    handle: ShutdownHandle,
    component: String,
    states: ComponentStates,
}

impl RunContext {
    pub(crate) fn new(
        token: CancellationToken,
        handle: ShutdownHandle,
        component: String,
        states: ComponentStates,
    ) -> Self {
        Self {
            token,
            handle,
            component,
            states,
        }
    }

    /// Report that the component is serving. A `start` that blocks until
    /// cancellation calls this once it accepts work; a `start` that returns
    /// `Ok` is marked running without it.
    pub async fn ready(&self) {
        self.states.mark_running(&self.component).await;
    }

    /// Completes once the run is cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token that follows the run cancellation, for handing to spawned tasks
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Report a fatal runtime failure; the application shuts down and
    /// `App::run` returns the error.
    pub fn fail(&self, error: AppError) {
        self.handle.fail(error);
    }

    pub fn shutdown_handle(&self) -> &ShutdownHandle {
        &self.handle
    }
}

/// Context handed to [`Component::stop`]. The deadline is shared by the whole
/// shutdown sequence, not per component.
#[derive(Debug, Clone)]
pub struct ShutdownContext {
    deadline: Instant,
}

impl ShutdownContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Budget left for the rest of the shutdown sequence
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Completes when the deadline passes
    pub async fn expired(&self) {
        sleep_until(self.deadline).await
    }
}
