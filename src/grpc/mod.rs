//! gRPC server and client plumbing.
//!
//! The server always exposes `grpc.health.v1.Health` and server reflection;
//! further services are registered through [`GrpcServer::routes_mut`]. When
//! the gateway is enabled an HTTP server with the JSON routes runs alongside
//! it and shares its lifecycle.

mod client;
mod interceptors;
mod server;

pub use client::{dial_insecure, ClientChannel, ClientSettings, ClientSettingsBuilder};
pub use interceptors::{
    request_id, request_id_interceptor, rpc_trace_layer, RpcMetrics, RpcMetricsLayer, RpcSide,
    RpcSpans, RpcTraceLayer,
};
pub use server::{GatewaySettings, GrpcServer, ServerSettings, ServerSettingsBuilder};
