use super::{App, ShutdownReason};
use crate::error::{AppError, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cloneable trigger for leaving the running state.
///
/// The first trigger wins: its reason decides what `App::run` returns, later
/// triggers are ignored.
#[derive(Clone)]
pub struct ShutdownHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    token: CancellationToken,
    reason: Mutex<Option<ShutdownReason>>,
}

impl ShutdownHandle {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(HandleInner {
                token: CancellationToken::new(),
                reason: Mutex::new(None),
            }),
        }
    }

    /// Request an ordinary shutdown
    pub fn shutdown(&self) {
        self.trigger(ShutdownReason::UserRequest);
    }

    /// Shut down because of a runtime failure
    pub fn fail(&self, error: AppError) {
        self.trigger(ShutdownReason::Error(error));
    }

    pub fn trigger(&self, reason: ShutdownReason) {
        let mut slot = self.inner.reason.lock();
        if slot.is_none() {
            *slot = Some(reason);
        }
        drop(slot);
        self.inner.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Completes once a shutdown has been triggered
    pub async fn triggered(&self) {
        self.inner.token.cancelled().await
    }

    pub(super) fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    pub(super) fn take_reason(&self) -> Option<ShutdownReason> {
        self.inner.reason.lock().take()
    }
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}

impl App {
    /// Run the application until SIGINT/SIGTERM, then stop every component
    pub async fn run(self) -> Result<()> {
        self.run_with_signal(shutdown_signal()).await
    }

    /// Run the application until `signal` resolves or a shutdown is triggered
    /// through the [`ShutdownHandle`].
    pub async fn run_with_signal<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ShutdownReason> + Send + 'static,
    {
        info!("app: starting application: {}", self.name);

        let handle = self.handle.clone();
        let signal_task = tokio::spawn(async move {
            let reason = signal.await;
            handle.trigger(reason);
        });

        let result = self.drive().await;
        signal_task.abort();
        result
    }

    async fn drive(&self) -> Result<()> {
        // Startup gets its own child so a failed start does not look like a
        // shutdown trigger.
        let startup_token = self.handle.token().child_token();
        let outcome = self.start_components(&startup_token).await;

        if let Some(e) = outcome.error {
            error!("app: failed to start application: {}", e);
            if self.cleanup_on_startup_failure && !outcome.started.is_empty() {
                info!(
                    "app: stopping {} already started component(s)",
                    outcome.started.len()
                );
                self.stop_components(&outcome.started).await;
            }
            return Err(e);
        }

        info!("app: all components started successfully");

        self.handle.triggered().await;

        let reason = self.handle.take_reason();
        match &reason {
            Some(ShutdownReason::Error(e)) => info!("app: shutdown initiated due to: {}", e),
            Some(ShutdownReason::Signal(name)) => {
                info!("app: shutdown signal received: {}", name)
            }
            Some(ShutdownReason::UserRequest) | None => {
                info!("app: shutdown requested or context cancelled normally")
            }
        }

        let all: Vec<usize> = (0..self.components.len()).collect();
        self.stop_components(&all).await;

        match reason {
            Some(ShutdownReason::Error(e)) => Err(AppError::Shutdown(Box::new(e))),
            _ => Ok(()),
        }
    }
}

/// Resolves on the first SIGINT or (on unix) SIGTERM
pub async fn shutdown_signal() -> ShutdownReason {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT signal (Ctrl+C)");
                ShutdownReason::Signal("SIGINT".to_string())
            }
            Err(e) => {
                error!("Failed to listen for SIGINT: {}", e);
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM signal");
                ShutdownReason::Signal("SIGTERM".to_string())
            }
            Err(e) => {
                error!("Failed to register SIGTERM handler: {}", e);
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<ShutdownReason>();

    tokio::select! {
        reason = ctrl_c => reason,
        reason = terminate => reason,
    }
}
