use crate::error::AppError;

/// Component lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

/// Why a running application left its steady state
#[derive(Debug)]
pub enum ShutdownReason {
    /// Process termination request (SIGINT, SIGTERM)
    Signal(String),
    /// Ordinary cancellation through a [`ShutdownHandle`](super::ShutdownHandle)
    UserRequest,
    /// Runtime failure; becomes the error returned by `App::run`
    Error(AppError),
}

impl ShutdownReason {
    pub fn is_error(&self) -> bool {
        matches!(self, ShutdownReason::Error(_))
    }
}
