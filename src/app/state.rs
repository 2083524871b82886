use super::ComponentState;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Shared view of every component's lifecycle state, keyed by name
#[derive(Debug, Clone, Default)]
pub struct ComponentStates {
    states: Arc<Mutex<HashMap<String, ComponentState>>>,
}

impl ComponentStates {
    /// Update component state
    pub async fn set(&self, component: &str, state: ComponentState) {
        let mut states = self.states.lock().await;
        states.insert(component.to_string(), state);
        debug!("Component '{}' state changed to: {:?}", component, state);
        publish_running(&states);
    }

    /// Move `component` from `Starting` to `Running`; any other state is kept
    pub(crate) async fn mark_running(&self, component: &str) {
        let mut states = self.states.lock().await;
        if let Some(state) = states.get_mut(component) {
            if *state == ComponentState::Starting {
                *state = ComponentState::Running;
                debug!("Component '{}' state changed to: Running", component);
                publish_running(&states);
            }
        }
    }

    /// Get component state
    pub async fn get(&self, component: &str) -> Option<ComponentState> {
        let states = self.states.lock().await;
        states.get(component).copied()
    }

    /// Get all component states
    pub async fn snapshot(&self) -> HashMap<String, ComponentState> {
        let states = self.states.lock().await;
        states.clone()
    }

    /// Number of components currently in the running state
    pub async fn running(&self) -> usize {
        let states = self.states.lock().await;
        count_running(&states)
    }
}

fn count_running(states: &HashMap<String, ComponentState>) -> usize {
    states
        .values()
        .filter(|state| **state == ComponentState::Running)
        .count()
}

fn publish_running(states: &HashMap<String, ComponentState>) {
    metrics::gauge!("app_components_running").set(count_running(states) as f64);
}
