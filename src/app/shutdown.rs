use super::{App, ComponentState, ShutdownContext};
use tokio::time::timeout_at;
use tracing::{error, info};

impl App {
    /// Stop the components at `indices` one at a time, last registered first.
    ///
    /// All stops share a single deadline. Failures and overruns are logged and
    /// never abort the sequence.
    pub(super) async fn stop_components(&self, indices: &[usize]) {
        info!("app: initiating graceful stop of application {}...", self.name);

        let ctx = ShutdownContext::with_timeout(self.shutdown_timeout);

        for &index in indices.iter().rev() {
            let component = &self.components[index];
            let name = component.name();
            info!("app: attempting to stop component: {}", name);
            self.states.set(name, ComponentState::Stopping).await;

            match timeout_at(ctx.deadline(), component.stop(&ctx)).await {
                Ok(Ok(())) => {
                    self.states.set(name, ComponentState::Stopped).await;
                    info!("app: component {} stopped successfully", name);
                }
                Ok(Err(e)) => {
                    self.states.set(name, ComponentState::Failed).await;
                    metrics::counter!("app_component_stop_failures_total", "component" => name.to_string())
                        .increment(1);
                    error!("app: error stopping component {}: {}", name, e);
                }
                Err(_) => {
                    self.states.set(name, ComponentState::Failed).await;
                    metrics::counter!("app_component_stop_failures_total", "component" => name.to_string())
                        .increment(1);
                    error!(
                        "app: component {} did not stop within the shutdown deadline",
                        name
                    );
                }
            }
        }

        info!("app: application {} stopped gracefully", self.name);
    }
}
