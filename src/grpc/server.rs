use super::interceptors::{request_id_interceptor, rpc_trace_layer, RpcMetricsLayer, RpcSide};
use crate::app::{Component, RunContext, ShutdownContext};
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::http::HttpServer;
use axum::Router;
use parking_lot::Mutex;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::service::RoutesBuilder;
use tonic::transport::Server;
use tonic_health::server::HealthReporter;
use tonic_health::ServingStatus;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{error, info, warn};

/// Name used for the overall server status in the health service
const HEALTH_OVERALL: &str = "";

/// Validated settings for [`GrpcServer`]
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub address: String,
    pub timeout: Duration,
    pub enable_metrics: bool,
    pub enable_tracing: bool,
    pub gateway: Option<GatewaySettings>,
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub address: String,
    pub timeout: Duration,
}

impl ServerSettings {
    pub fn builder() -> ServerSettingsBuilder {
        ServerSettingsBuilder::default()
    }

    /// Settings derived from the `[grpc]`, `[http]` and metrics configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mut builder = Self::builder()
            .address(config.grpc.addr.clone())
            .timeout(config.grpc.timeout())
            .metrics(config.enable_metrics)
            .tracing(config.tracing.enabled);
        if config.grpc.gateway.enabled {
            builder = builder.gateway(config.http.addr.clone(), config.http.timeout());
        }
        builder.build()
    }
}

pub struct ServerSettingsBuilder {
    address: String,
    timeout: Duration,
    enable_metrics: bool,
    enable_tracing: bool,
    gateway: Option<GatewaySettings>,
}

impl Default for ServerSettingsBuilder {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:0".to_string(),
            timeout: Duration::from_secs(5),
            enable_metrics: false,
            enable_tracing: false,
            gateway: None,
        }
    }
}

impl ServerSettingsBuilder {
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }

    /// Open a span per call
    pub fn tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    /// Serve an HTTP gateway on `address` next to the gRPC server
    pub fn gateway(mut self, address: impl Into<String>, timeout: Duration) -> Self {
        self.gateway = Some(GatewaySettings {
            address: address.into(),
            timeout,
        });
        self
    }

    pub fn build(self) -> Result<ServerSettings> {
        self.address.parse::<SocketAddr>().map_err(|e| {
            AppError::settings(format!("grpc address '{}': {}", self.address, e))
        })?;
        if self.timeout.is_zero() {
            return Err(AppError::settings("grpc timeout must be greater than 0"));
        }
        if let Some(gateway) = &self.gateway {
            gateway.address.parse::<SocketAddr>().map_err(|e| {
                AppError::settings(format!("gateway address '{}': {}", gateway.address, e))
            })?;
            if gateway.timeout.is_zero() {
                return Err(AppError::settings("gateway timeout must be greater than 0"));
            }
        }

        Ok(ServerSettings {
            address: self.address,
            timeout: self.timeout,
            enable_metrics: self.enable_metrics,
            enable_tracing: self.enable_tracing,
            gateway: self.gateway,
        })
    }
}

/// gRPC server with the standard health and reflection services and an
/// optional HTTP gateway
pub struct GrpcServer {
    settings: ServerSettings,
    local_addr: SocketAddr,
    listener: Mutex<Option<std::net::TcpListener>>,
    routes: Mutex<Option<RoutesBuilder>>,
    health: HealthReporter,
    gateway: Option<HttpServer>,
    shutdown: CancellationToken,
    serving: watch::Sender<bool>,
}

impl GrpcServer {
    /// Bind the gRPC listener (and the gateway listener when enabled)
    pub fn new(settings: ServerSettings) -> Result<Self> {
        let listener = std::net::TcpListener::bind(&settings.address).map_err(|e| {
            AppError::component(
                "grpc-server",
                format!("failed to bind {}: {}", settings.address, e),
            )
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let (health, health_service) = tonic_health::server::health_reporter();
        let reflection_service = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(tonic_health::pb::FILE_DESCRIPTOR_SET)
            .build_v1()
            .map_err(|e| AppError::system(format!("failed to build reflection service: {}", e)))?;

        let mut routes = RoutesBuilder::default();
        routes
            .add_service(health_service)
            .add_service(reflection_service);

        let gateway = match &settings.gateway {
            Some(gateway) => Some(
                HttpServer::bind("gateway", &gateway.address, Router::new())?
                    .with_timeout(gateway.timeout)
                    .with_metrics(settings.enable_metrics),
            ),
            None => None,
        };

        let (serving, _) = watch::channel(false);

        Ok(Self {
            settings,
            local_addr,
            listener: Mutex::new(Some(listener)),
            routes: Mutex::new(Some(routes)),
            health,
            gateway,
            shutdown: CancellationToken::new(),
            serving,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn gateway_addr(&self) -> Option<SocketAddr> {
        self.gateway.as_ref().map(HttpServer::local_addr)
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Register additional tonic services before the server starts
    pub fn routes_mut(&mut self) -> &mut RoutesBuilder {
        self.routes.get_mut().get_or_insert_with(RoutesBuilder::default)
    }

    /// Register HTTP gateway routes; ignored when the gateway is disabled
    pub fn register_gateway_routes(&mut self, routes: Router) {
        match self.gateway.as_mut() {
            Some(gateway) => gateway.merge(routes),
            None => warn!("[grpc] gateway disabled, ignoring gateway routes"),
        }
    }

    pub fn is_serving(&self) -> bool {
        *self.serving.borrow()
    }

    /// Resolves when the run is cancelled or a stop is requested
    fn stop_signal(&self, ctx: &RunContext) -> impl Future<Output = ()> + Send + 'static {
        let run = ctx.token().clone();
        let shutdown = self.shutdown.clone();
        async move {
            tokio::select! {
                _ = run.cancelled() => {}
                _ = shutdown.cancelled() => {}
            }
        }
    }

    async fn serve_grpc(&self, ctx: &RunContext) -> Result<()> {
        let listener = self
            .listener
            .lock()
            .take()
            .ok_or_else(|| AppError::component(self.name(), "server already started"))?;
        let routes = self.routes.lock().take().unwrap_or_default().routes();
        let listener = tokio::net::TcpListener::from_std(listener)?;

        let layer = ServiceBuilder::new()
            .layer(CatchPanicLayer::new())
            .layer(rpc_trace_layer(RpcSide::Server, self.settings.enable_tracing))
            .layer(RpcMetricsLayer::new(RpcSide::Server, self.settings.enable_metrics))
            .layer(tonic::service::interceptor(request_id_interceptor))
            .into_inner();

        info!("[grpc] server listening on: {}", self.local_addr);
        ctx.ready().await;

        let result = Server::builder()
            .timeout(self.settings.timeout)
            .layer(layer)
            .add_routes(routes)
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), self.stop_signal(ctx))
            .await;

        // Take the gateway down with the gRPC server, whatever ended it
        self.shutdown.cancel();
        result.map_err(AppError::from)
    }

    async fn serve_gateway(&self, ctx: &RunContext) {
        if let Some(gateway) = &self.gateway {
            if let Err(e) = gateway.serve_until(self.stop_signal(ctx)).await {
                error!("[gateway] server error: {}", e);
            }
        }
    }
}

#[async_trait::async_trait]
impl Component for GrpcServer {
    fn name(&self) -> &str {
        if self.gateway.is_some() {
            "grpc+gateway-server"
        } else {
            "grpc-server"
        }
    }

    /// Serves until the run is cancelled or `stop` is called
    async fn start(&self, ctx: RunContext) -> Result<()> {
        self.health
            .clone()
            .set_service_status(HEALTH_OVERALL, ServingStatus::Serving)
            .await;
        self.serving.send_replace(true);

        let (result, ()) = tokio::join!(self.serve_grpc(&ctx), self.serve_gateway(&ctx));

        self.serving.send_replace(false);
        info!("[grpc] server stopped");
        result
    }

    async fn stop(&self, ctx: &ShutdownContext) -> Result<()> {
        // Reject new work before draining
        self.health
            .clone()
            .set_service_status(HEALTH_OVERALL, ServingStatus::NotServing)
            .await;

        self.shutdown.cancel();
        if let Some(gateway) = &self.gateway {
            gateway.request_stop();
        }

        let mut serving = self.serving.subscribe();
        let drained = async move { serving.wait_for(|serving| !*serving).await.is_ok() };
        tokio::select! {
            drained = drained => {
                if !drained {
                    error!("[grpc] serving state channel closed");
                }
                Ok(())
            }
            _ = ctx.expired() => Err(AppError::component(
                self.name(),
                "graceful stop did not finish before the shutdown deadline",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_settings_validation() {
        assert!(ServerSettings::builder().address("127.0.0.1:0").build().is_ok());
        assert!(ServerSettings::builder().address("").build().is_err());
        assert!(ServerSettings::builder()
            .address("127.0.0.1:0")
            .timeout(Duration::ZERO)
            .build()
            .is_err());
        assert!(ServerSettings::builder()
            .address("127.0.0.1:0")
            .gateway("nowhere", Duration::from_secs(1))
            .build()
            .is_err());
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = AppConfig::default();
        config.grpc.gateway.enabled = true;
        config.enable_metrics = true;
        config.tracing.enabled = true;

        let settings = ServerSettings::from_config(&config).unwrap();
        assert!(settings.enable_tracing);
        assert_eq!(settings.address, config.grpc.addr);
        assert_eq!(settings.timeout, config.grpc.timeout());
        assert!(settings.enable_metrics);
        assert_eq!(settings.gateway.unwrap().address, config.http.addr);
    }

    #[tokio::test]
    async fn test_name_reflects_gateway() {
        let plain = GrpcServer::new(
            ServerSettings::builder().address("127.0.0.1:0").build().unwrap(),
        )
        .unwrap();
        assert_eq!(plain.name(), "grpc-server");
        assert!(plain.gateway_addr().is_none());

        let gateway = GrpcServer::new(
            ServerSettings::builder()
                .address("127.0.0.1:0")
                .gateway("127.0.0.1:0", Duration::from_secs(1))
                .build()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(gateway.name(), "grpc+gateway-server");
        assert!(gateway.gateway_addr().is_some());
    }

    #[tokio::test]
    async fn test_bind_conflict_fails_construction() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let result = GrpcServer::new(ServerSettings::builder().address(addr).build().unwrap());
        assert!(matches!(result, Err(AppError::Component { .. })));
    }

    #[tokio::test]
    async fn test_gateway_serves_registered_routes() {
        use crate::app::{App, ShutdownReason};
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut server = GrpcServer::new(
            ServerSettings::builder()
                .address("127.0.0.1:0")
                .gateway("127.0.0.1:0", Duration::from_secs(1))
                .build()
                .unwrap(),
        )
        .unwrap();
        server.register_gateway_routes(crate::handlers::router());
        let gateway = server.gateway_addr().unwrap();

        let app = App::builder("gateway-test")
            .component(server)
            .shutdown_timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let handle = app.shutdown_handle();
        let running = tokio::spawn(app.run_with_signal(std::future::pending::<ShutdownReason>()));

        let mut stream = tokio::net::TcpStream::connect(gateway).await.unwrap();
        stream
            .write_all(b"GET /v1/healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"status\":\"HEALTHY\""));

        handle.shutdown();
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stop_before_start_returns() {
        let server = GrpcServer::new(
            ServerSettings::builder().address("127.0.0.1:0").build().unwrap(),
        )
        .unwrap();
        let ctx = ShutdownContext::with_timeout(Duration::from_millis(100));
        assert!(server.stop(&ctx).await.is_ok());
        assert!(!server.is_serving());
    }
}
