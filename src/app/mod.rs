//! Component lifecycle management.
//!
//! ```text
//! run():
//!     start all components concurrently ──(any error)──▶ return first error
//!         │
//!         ▼
//!     wait for signal / ShutdownHandle
//!         │
//!         ▼
//!     stop components in reverse order under one shared deadline
//!         │
//!         ▼
//!     Ok(()) or Err(Shutdown(cause)) when a runtime failure triggered it
//! ```

mod component;
mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;

#[cfg(test)]
mod tests;

pub use component::{Component, RunContext, ShutdownContext};
pub use orchestrator::{App, AppBuilder, DEFAULT_SHUTDOWN_TIMEOUT};
pub use runtime::{shutdown_signal, ShutdownHandle};
pub use state::ComponentStates;
pub use types::{ComponentState, ShutdownReason};
