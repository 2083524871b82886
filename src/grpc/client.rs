use super::interceptors::{
    request_id_interceptor, rpc_trace_layer, RpcMetrics, RpcMetricsLayer, RpcSide, RpcSpans,
};
use crate::error::{AppError, Result};
use std::time::Duration;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};
use tower::Layer;
use tower_http::classify::{GrpcErrorsAsFailures, SharedClassifier};
use tower_http::trace::Trace;

type Interceptor = fn(Request<()>) -> std::result::Result<Request<()>, Status>;

type TracedChannel = Trace<RpcMetrics<Channel>, SharedClassifier<GrpcErrorsAsFailures>, RpcSpans>;

/// Channel with request ids, spans and client-side metrics, usable by any
/// generated client
pub type ClientChannel = InterceptedService<TracedChannel, Interceptor>;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub endpoint: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub enable_metrics: bool,
    pub enable_tracing: bool,
}

impl ClientSettings {
    pub fn builder(endpoint: impl Into<String>) -> ClientSettingsBuilder {
        ClientSettingsBuilder {
            endpoint: endpoint.into(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_TIMEOUT,
            enable_metrics: false,
            enable_tracing: true,
        }
    }
}

pub struct ClientSettingsBuilder {
    endpoint: String,
    timeout: Duration,
    connect_timeout: Duration,
    enable_metrics: bool,
    enable_tracing: bool,
}

impl ClientSettingsBuilder {
    /// Per-call deadline
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }

    /// Open a span per call; on by default
    pub fn tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    pub fn build(self) -> Result<ClientSettings> {
        if self.endpoint.is_empty() {
            return Err(AppError::settings("client endpoint must not be empty"));
        }
        if self.timeout.is_zero() {
            return Err(AppError::settings("client timeout must be greater than 0"));
        }

        Ok(ClientSettings {
            endpoint: self.endpoint,
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            enable_metrics: self.enable_metrics,
            enable_tracing: self.enable_tracing,
        })
    }
}

/// Plaintext channel to `settings.endpoint`. The connection is established
/// on first use, so an unreachable server surfaces as a call error.
pub fn dial_insecure(settings: &ClientSettings) -> Result<ClientChannel> {
    let channel = Endpoint::from_shared(settings.endpoint.clone())?
        .timeout(settings.timeout)
        .connect_timeout(settings.connect_timeout)
        .connect_lazy();

    let channel = RpcMetricsLayer::new(RpcSide::Client, settings.enable_metrics).layer(channel);
    let channel = rpc_trace_layer(RpcSide::Client, settings.enable_tracing).layer(channel);
    Ok(InterceptedService::new(
        channel,
        request_id_interceptor as Interceptor,
    ))
}
