use super::{Component, ComponentStates, ShutdownHandle};
use crate::config::LifecycleConfig;
use crate::error::{AppError, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Overall budget for stopping every component
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(20);

/// Lifecycle manager for an ordered set of components.
///
/// Registration order matters: all components start concurrently, and stop
/// one at a time in reverse registration order.
pub struct App {
    pub(super) name: String,
    pub(super) components: Vec<Arc<dyn Component>>,
    pub(super) shutdown_timeout: Duration,
    pub(super) cleanup_on_startup_failure: bool,
    pub(super) states: ComponentStates,
    pub(super) handle: ShutdownHandle,
}

impl App {
    /// Create an application with default lifecycle options. Component names
    /// must be unique; [`AppBuilder::build`] checks this.
    pub(crate) fn new(name: impl Into<String>, components: Vec<Arc<dyn Component>>) -> Self {
        let app = Self {
            name: name.into(),
            components,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            cleanup_on_startup_failure: false,
            states: ComponentStates::default(),
            handle: ShutdownHandle::new(),
        };
        info!(
            app = %app.name,
            components = app.components.len(),
            "app: all components initialized and dependencies injected"
        );
        app
    }

    pub fn builder(name: impl Into<String>) -> AppBuilder {
        AppBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Component names in registration order
    pub fn component_names(&self) -> Vec<String> {
        self.components
            .iter()
            .map(|component| component.name().to_string())
            .collect()
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Handle for requesting shutdown from outside the application
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }

    /// Lifecycle states, observable during and after a run
    pub fn states(&self) -> ComponentStates {
        self.states.clone()
    }
}

/// Builder for [`App`] with validated lifecycle options
pub struct AppBuilder {
    name: String,
    components: Vec<Arc<dyn Component>>,
    shutdown_timeout: Duration,
    cleanup_on_startup_failure: bool,
}

impl AppBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            components: Vec::new(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            cleanup_on_startup_failure: false,
        }
    }

    /// Register a component; order of calls is the registration order
    pub fn component<C: Component + 'static>(mut self, component: C) -> Self {
        self.components.push(Arc::new(component));
        self
    }

    pub fn components(mut self, components: impl IntoIterator<Item = Arc<dyn Component>>) -> Self {
        self.components.extend(components);
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn cleanup_on_startup_failure(mut self, enabled: bool) -> Self {
        self.cleanup_on_startup_failure = enabled;
        self
    }

    /// Apply the `[lifecycle]` configuration section
    pub fn lifecycle(self, config: &LifecycleConfig) -> Self {
        self.shutdown_timeout(config.shutdown_timeout())
            .cleanup_on_startup_failure(config.cleanup_on_startup_failure)
    }

    pub fn build(self) -> Result<App> {
        if self.shutdown_timeout.is_zero() {
            return Err(AppError::settings("shutdown timeout must be greater than 0"));
        }

        // States are tracked by name
        let mut names = HashSet::new();
        for component in &self.components {
            if !names.insert(component.name()) {
                return Err(AppError::settings(format!(
                    "duplicate component name '{}'",
                    component.name()
                )));
            }
        }

        let mut app = App::new(self.name, self.components);
        app.shutdown_timeout = self.shutdown_timeout;
        app.cleanup_on_startup_failure = self.cleanup_on_startup_failure;
        Ok(app)
    }
}
