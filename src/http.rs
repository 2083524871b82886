//! Axum based HTTP server usable as a lifecycle component.
//!
//! Serves the gRPC gateway routes and the Prometheus scrape endpoint.

use crate::app::{Component, RunContext, ShutdownContext};
use crate::error::{AppError, Result};
use crate::metrics::track_metrics;
use axum::Router;
use parking_lot::Mutex;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

/// Header carrying the request id on both the gateway and gRPC side
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// HTTP server bound at construction and served by [`Component::start`]
pub struct HttpServer {
    name: String,
    local_addr: SocketAddr,
    listener: Mutex<Option<std::net::TcpListener>>,
    router: Mutex<Option<Router>>,
    timeout: Duration,
    enable_metrics: bool,
    shutdown: CancellationToken,
    serving: watch::Sender<bool>,
}

impl HttpServer {
    /// Bind `addr` and prepare to serve `router`
    pub fn bind(name: impl Into<String>, addr: &str, router: Router) -> Result<Self> {
        let name = name.into();
        let listener = std::net::TcpListener::bind(addr).map_err(|e| {
            AppError::component(name.clone(), format!("failed to bind {}: {}", addr, e))
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        let (serving, _) = watch::channel(false);

        Ok(Self {
            name,
            local_addr,
            listener: Mutex::new(Some(listener)),
            router: Mutex::new(Some(router)),
            timeout: Duration::from_secs(10),
            enable_metrics: false,
            shutdown: CancellationToken::new(),
            serving,
        })
    }

    /// Per-request timeout, answered with 408
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Record request counts and latencies for every route
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Add routes before the server starts
    pub fn merge(&mut self, routes: Router) {
        let router = self.router.get_mut();
        *router = Some(router.take().unwrap_or_default().merge(routes));
    }

    pub fn is_serving(&self) -> bool {
        *self.serving.borrow()
    }

    /// Completes once the serve loop is up; `false` if it can no longer start
    pub(crate) async fn wait_serving(&self) -> bool {
        let mut serving = self.serving.subscribe();
        let ready = serving.wait_for(|serving| *serving).await.is_ok();
        ready
    }

    fn app(&self, router: Router) -> Router {
        let router = if self.enable_metrics {
            router.layer(axum::middleware::from_fn(track_metrics))
        } else {
            router
        };

        router
            .layer(TimeoutLayer::new(self.timeout))
            .layer(CatchPanicLayer::new())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Serve until `signal` completes or [`HttpServer::request_stop`] is called
    pub(crate) async fn serve_until<F>(&self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = self
            .listener
            .lock()
            .take()
            .ok_or_else(|| AppError::component(self.name.clone(), "server already started"))?;
        let router = self.router.lock().take().unwrap_or_default();
        let listener = tokio::net::TcpListener::from_std(listener)?;

        let shutdown = self.shutdown.clone();
        let stop = async move {
            tokio::select! {
                _ = signal => {}
                _ = shutdown.cancelled() => {}
            }
        };

        info!("[{}] server listening on: {}", self.name, self.local_addr);
        self.serving.send_replace(true);

        let result = axum::serve(listener, self.app(router))
            .with_graceful_shutdown(stop)
            .await;

        self.serving.send_replace(false);
        info!("[{}] server stopped", self.name);
        result.map_err(AppError::from)
    }

    /// Ask a running server to drain and stop
    pub(crate) fn request_stop(&self) {
        self.shutdown.cancel();
    }

    /// Request a graceful stop and wait for it, bounded by the shutdown deadline
    pub(crate) async fn stop_within(&self, ctx: &ShutdownContext) -> Result<()> {
        self.request_stop();

        let mut serving = self.serving.subscribe();
        let drained = async move { serving.wait_for(|serving| !*serving).await.is_ok() };
        tokio::select! {
            drained = drained => {
                if !drained {
                    error!("[{}] serving state channel closed", self.name);
                }
                Ok(())
            }
            _ = ctx.expired() => Err(AppError::component(
                self.name.clone(),
                "graceful stop did not finish before the shutdown deadline",
            )),
        }
    }
}

#[async_trait::async_trait]
impl Component for HttpServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, ctx: RunContext) -> Result<()> {
        let token = ctx.token().clone();
        let serve = self.serve_until(async move { token.cancelled().await });
        tokio::pin!(serve);

        tokio::select! {
            result = &mut serve => return result,
            serving = self.wait_serving() => {
                if serving {
                    ctx.ready().await;
                }
            }
        }
        serve.await
    }

    async fn stop(&self, ctx: &ShutdownContext) -> Result<()> {
        self.stop_within(ctx).await
    }
}
