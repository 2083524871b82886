//! Request id interceptor, request spans and request metrics layer shared by
//! the gRPC server and client.

use crate::http::REQUEST_ID_HEADER;
use futures::future::BoxFuture;
use http::{Request, Response};
use std::task::{Context, Poll};
use std::time::Instant;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::Status;
use tower::{Layer, Service};
use tower_http::classify::{GrpcErrorsAsFailures, SharedClassifier};
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::Span;

/// Attach a fresh `x-request-id` when the caller did not send one
pub fn request_id_interceptor(mut request: tonic::Request<()>) -> Result<tonic::Request<()>, Status> {
    if request.metadata().get(REQUEST_ID_HEADER).is_none() {
        let id: MetadataValue<Ascii> = uuid::Uuid::new_v4()
            .to_string()
            .parse()
            .map_err(|_| Status::internal("invalid request id"))?;
        request.metadata_mut().insert(REQUEST_ID_HEADER, id);
    }
    Ok(request)
}

/// Read the request id attached by [`request_id_interceptor`]
pub fn request_id<T>(request: &tonic::Request<T>) -> Option<&str> {
    request
        .metadata()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
}

/// Which end of the connection a [`RpcMetricsLayer`] instruments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcSide {
    Server,
    Client,
}

impl RpcSide {
    fn duration_metric(self) -> &'static str {
        match self {
            RpcSide::Server => "rpc_server_requests_duration_ms",
            RpcSide::Client => "rpc_client_requests_duration_ms",
        }
    }

    fn code_metric(self) -> &'static str {
        match self {
            RpcSide::Server => "rpc_server_requests_code_total",
            RpcSide::Client => "rpc_client_requests_code_total",
        }
    }
}

/// Span per call, named after the side and carrying the method and request id.
/// Disabled instances yield [`Span::none`].
#[derive(Debug, Clone, Copy)]
pub struct RpcSpans {
    side: RpcSide,
    enabled: bool,
}

impl RpcSpans {
    pub fn new(side: RpcSide, enabled: bool) -> Self {
        Self { side, enabled }
    }
}

impl<B> MakeSpan<B> for RpcSpans {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        if !self.enabled {
            return Span::none();
        }

        let method = request.uri().path();
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        match self.side {
            RpcSide::Server => {
                tracing::info_span!("grpc.server", rpc.method = %method, request_id = %request_id)
            }
            RpcSide::Client => {
                tracing::info_span!("grpc.client", rpc.method = %method, request_id = %request_id)
            }
        }
    }
}

pub type RpcTraceLayer = TraceLayer<SharedClassifier<GrpcErrorsAsFailures>, RpcSpans>;

/// gRPC aware trace layer; spans are exported when OpenTelemetry is enabled
pub fn rpc_trace_layer(side: RpcSide, enabled: bool) -> RpcTraceLayer {
    TraceLayer::new_for_grpc().make_span_with(RpcSpans::new(side, enabled))
}

/// Records per-method latency (milliseconds) and status code counts
#[derive(Debug, Clone, Copy)]
pub struct RpcMetricsLayer {
    side: RpcSide,
    enabled: bool,
}

impl RpcMetricsLayer {
    pub fn new(side: RpcSide, enabled: bool) -> Self {
        Self { side, enabled }
    }
}

impl<S> Layer<S> for RpcMetricsLayer {
    type Service = RpcMetrics<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RpcMetrics {
            inner,
            side: self.side,
            enabled: self.enabled,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RpcMetrics<S> {
    inner: S,
    side: RpcSide,
    enabled: bool,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RpcMetrics<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        // The clone may not be ready; keep the polled instance for this call
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let side = self.side;
        let enabled = self.enabled;
        let method = request.uri().path().to_owned();

        Box::pin(async move {
            let start = Instant::now();
            let result = inner.call(request).await;

            if enabled {
                let code = match &result {
                    // Trailers-only responses carry the status in the headers
                    Ok(response) => response
                        .headers()
                        .get("grpc-status")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("0")
                        .to_string(),
                    Err(_) => (tonic::Code::Unavailable as i32).to_string(),
                };
                let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

                metrics::histogram!(side.duration_metric(), "method" => method.clone())
                    .record(elapsed_ms);
                metrics::counter!(side.code_metric(), "method" => method, "code" => code)
                    .increment(1);
            }

            result
        })
    }
}
