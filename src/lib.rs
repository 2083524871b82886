pub mod app;
pub mod config;
pub mod error;
pub mod grpc;
pub mod handlers;
pub mod http;
pub mod logging;
pub mod metrics;

pub use crate::app::{
    shutdown_signal, App, AppBuilder, Component, ComponentState, ComponentStates, RunContext,
    ShutdownContext, ShutdownHandle, ShutdownReason,
};
pub use crate::config::{AppConfig, LogFormat, ServerMode, TracingConfig};
pub use crate::error::{AppError, Result};
pub use crate::grpc::{dial_insecure, ClientSettings, GrpcServer, ServerSettings};
pub use crate::http::HttpServer;
pub use crate::logging::{init_logging, LogOverrides, LoggingGuard};
