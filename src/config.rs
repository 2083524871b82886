use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Application name used in logs and diagnostics
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Expose Prometheus metrics and instrument servers
    #[serde(default = "default_enable_metrics")]
    pub enable_metrics: bool,

    /// Server mode, drives the default log format
    #[serde(default)]
    pub server_mode: ServerMode,

    pub http: HttpConfig,
    pub grpc: GrpcConfig,
    pub metrics: MetricsConfig,
    pub log: LogConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    #[default]
    Debug,
    Release,
}

/// HTTP settings, used by the gRPC gateway
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    /// Address the gateway binds to
    #[serde(default = "default_http_addr")]
    pub addr: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GrpcConfig {
    /// Address the gRPC server binds to
    #[serde(default = "default_grpc_addr")]
    pub addr: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_grpc_timeout")]
    pub timeout_seconds: u64,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct GatewayConfig {
    /// Serve the HTTP gateway next to the gRPC server
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MetricsConfig {
    /// Address of the Prometheus scrape endpoint
    #[serde(default = "default_metrics_addr")]
    pub addr: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LogConfig {
    /// Default level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty, compact); derived from the server mode when unset
    #[serde(default)]
    pub format: Option<LogFormat>,

    /// Directory for daily rolling log files; stdout only when unset
    #[serde(default)]
    pub directory: Option<String>,

    /// File name prefix for rolling log files
    #[serde(default = "default_log_file_prefix")]
    pub file_prefix: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// OpenTelemetry span export over OTLP/gRPC
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TracingConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Collector endpoint, e.g. `http://localhost:4317`
    #[serde(default = "default_otlp_endpoint")]
    pub endpoint: String,

    /// Fraction of root traces to sample, 0.0 to 1.0
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otlp_endpoint(),
            sampling_rate: default_sampling_rate(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LifecycleConfig {
    /// Budget for stopping every component, in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,

    /// Stop already-started components when a sibling fails to start
    #[serde(default)]
    pub cleanup_on_startup_failure: bool,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl GrpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl LifecycleConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

impl LogConfig {
    /// Format to use when neither the config nor the command line picks one
    pub fn effective_format(&self, mode: ServerMode) -> LogFormat {
        self.format.unwrap_or(match mode {
            ServerMode::Debug => LogFormat::Pretty,
            ServerMode::Release => LogFormat::Json,
        })
    }
}

impl AppConfig {
    /// Load configuration from a specific file path, layered over defaults and
    /// `APP_` prefixed environment variables (`APP_GRPC__ADDR`, ...)
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        debug!("Loading configuration from: {}", path.as_ref().display());

        let settings = Config::builder()
            .set_default("app_name", default_app_name())?
            .set_default("enable_metrics", default_enable_metrics())?
            .set_default("server_mode", "debug")?
            .set_default("http.addr", default_http_addr())?
            .set_default("http.timeout_seconds", default_http_timeout() as i64)?
            .set_default("grpc.addr", default_grpc_addr())?
            .set_default("grpc.timeout_seconds", default_grpc_timeout() as i64)?
            .set_default("grpc.gateway.enabled", false)?
            .set_default("metrics.addr", default_metrics_addr())?
            .set_default("log.level", default_log_level())?
            .set_default("log.file_prefix", default_log_file_prefix())?
            .set_default("tracing.enabled", false)?
            .set_default("tracing.endpoint", default_otlp_endpoint())?
            .set_default("tracing.sampling_rate", default_sampling_rate())?
            .set_default(
                "lifecycle.shutdown_timeout_seconds",
                default_shutdown_timeout() as i64,
            )?
            .set_default("lifecycle.cleanup_on_startup_failure", false)?
            // Configuration file is optional
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_name.trim().is_empty() {
            return Err(ConfigError::Message(
                "app_name must not be empty".to_string(),
            ));
        }

        validate_addr("grpc.addr", &self.grpc.addr)?;
        if self.grpc.gateway.enabled {
            validate_addr("http.addr", &self.http.addr)?;
        }
        if self.enable_metrics {
            validate_addr("metrics.addr", &self.metrics.addr)?;
        }

        if self.grpc.timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "grpc.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.http.timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "http.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.lifecycle.shutdown_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "lifecycle.shutdown_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.tracing.enabled {
            if self.tracing.endpoint.trim().is_empty() {
                return Err(ConfigError::Message(
                    "tracing.endpoint must be set when tracing is enabled".to_string(),
                ));
            }
            if !(0.0..=1.0).contains(&self.tracing.sampling_rate) {
                return Err(ConfigError::Message(format!(
                    "tracing.sampling_rate {} is outside 0.0..=1.0",
                    self.tracing.sampling_rate
                )));
            }
        }

        match self.log.level.to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::Message(format!(
                    "log.level '{}' is not one of trace, debug, info, warn, error",
                    other
                )))
            }
        }

        Ok(())
    }
}

fn validate_addr(key: &str, addr: &str) -> Result<(), ConfigError> {
    addr.parse::<SocketAddr>().map(|_| ()).map_err(|e| {
        ConfigError::Message(format!("{} '{}' is not a socket address: {}", key, addr, e))
    })
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: None,
            directory: None,
            file_prefix: default_log_file_prefix(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            enable_metrics: default_enable_metrics(),
            server_mode: ServerMode::default(),
            http: HttpConfig {
                addr: default_http_addr(),
                timeout_seconds: default_http_timeout(),
            },
            grpc: GrpcConfig {
                addr: default_grpc_addr(),
                timeout_seconds: default_grpc_timeout(),
                gateway: GatewayConfig::default(),
            },
            metrics: MetricsConfig {
                addr: default_metrics_addr(),
            },
            log: LogConfig::default(),
            tracing: TracingConfig::default(),
            lifecycle: LifecycleConfig {
                shutdown_timeout_seconds: default_shutdown_timeout(),
                cleanup_on_startup_failure: false,
            },
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "demo-server".to_string()
}
fn default_enable_metrics() -> bool {
    false
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_http_timeout() -> u64 {
    10
}

fn default_grpc_addr() -> String {
    "0.0.0.0:9090".to_string()
}
fn default_grpc_timeout() -> u64 {
    5
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9091".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_file_prefix() -> String {
    "app.log".to_string()
}

fn default_otlp_endpoint() -> String {
    "http://localhost:4317".to_string()
}
fn default_sampling_rate() -> f64 {
    1.0
}

fn default_shutdown_timeout() -> u64 {
    20
}
