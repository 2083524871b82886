use super::{App, ComponentState, RunContext};
use crate::error::AppError;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Result of the concurrent startup phase
#[derive(Debug, Default)]
pub(super) struct StartupOutcome {
    /// Registration indices of components whose `start` returned `Ok`, ascending
    pub(super) started: Vec<usize>,
    /// First failure observed while joining the start tasks
    pub(super) error: Option<AppError>,
}

impl App {
    /// Start every component concurrently and wait for all `start` calls to
    /// return. The first failure cancels `token` so blocking siblings unwind.
    pub(super) async fn start_components(&self, token: &CancellationToken) -> StartupOutcome {
        let mut tasks = JoinSet::new();

        for (index, component) in self.components.iter().enumerate() {
            let component = Arc::clone(component);
            let states = self.states.clone();
            let name = component.name().to_string();
            let ctx = RunContext::new(
                token.clone(),
                self.handle.clone(),
                name.clone(),
                states.clone(),
            );

            tasks.spawn(async move {
                info!("app: starting {}", name);
                states.set(&name, ComponentState::Starting).await;

                let result = component.start(ctx).await;
                match &result {
                    Ok(()) => states.mark_running(&name).await,
                    Err(e) => {
                        error!("app: failed to start {}: {}", name, e);
                        metrics::counter!("app_component_start_failures_total", "component" => name.clone())
                            .increment(1);
                        states.set(&name, ComponentState::Failed).await;
                    }
                }
                (index, result)
            });
        }

        info!("app: waiting for initial component start tasks to complete...");

        let mut outcome = StartupOutcome::default();
        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok((index, Ok(()))) => {
                    outcome.started.push(index);
                    continue;
                }
                Ok((_, Err(e))) => e,
                Err(e) => AppError::system(format!("component start task failed: {}", e)),
            };

            if outcome.error.is_none() {
                token.cancel();
                outcome.error = Some(failure);
            }
        }

        outcome.started.sort_unstable();
        outcome
    }
}
