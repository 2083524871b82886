use crate::config::{AppConfig, LogConfig, LogFormat, ServerMode, TracingConfig};
use crate::error::{AppError, Result};
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{BatchConfig, RandomIdGenerator, Sampler, Tracer};
use opentelemetry_sdk::{runtime, Resource};
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Command line overrides applied on top of the `[log]` section
#[derive(Debug, Clone, Default)]
pub struct LogOverrides {
    pub level: Option<String>,
    pub format: Option<LogFormat>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps log output alive; dropping it flushes the rolling file writer and
/// pending OpenTelemetry spans.
#[must_use = "logs are lost once the guard is dropped"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
    otel: bool,
}

impl Drop for LoggingGuard {
    fn drop(&mut self) {
        if self.otel {
            opentelemetry::global::shutdown_tracer_provider();
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over both the config and the overrides. Must be called
/// from within a tokio runtime when span export is enabled.
pub fn init_logging(config: &AppConfig, overrides: &LogOverrides) -> Result<LoggingGuard> {
    let log = &config.log;
    let mode = config.server_mode;
    let filter = build_filter(log, overrides)?;
    let format = overrides
        .format
        .unwrap_or_else(|| log.effective_format(mode));
    let verbose = mode == ServerMode::Debug;

    let mut layers: Vec<BoxedLayer> = vec![stdout_layer(format, verbose)];

    let file_guard = match &log.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &log.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    if config.tracing.enabled {
        let tracer = init_tracer(&config.tracing, &config.app_name)?;
        layers.push(OpenTelemetryLayer::new(tracer).boxed());
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| AppError::system(format!("failed to install subscriber: {}", e)))?;

    Ok(LoggingGuard {
        _file: file_guard,
        otel: config.tracing.enabled,
    })
}

/// Batch OTLP exporter over gRPC, installed as the global tracer provider
fn init_tracer(config: &TracingConfig, service_name: &str) -> Result<Tracer> {
    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_trace_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(sampler(config.sampling_rate))
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![KeyValue::new(
                    "service.name",
                    service_name.to_string(),
                )])),
        )
        .with_batch_config(BatchConfig::default())
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(&config.endpoint)
                .with_timeout(Duration::from_secs(3)),
        )
        .install_batch(runtime::Tokio)
        .map_err(|e| AppError::system(format!("failed to install OTLP tracer: {}", e)))
}

/// Follow the caller's sampling decision, sample new traces at `rate`
fn sampler(rate: f64) -> Sampler {
    Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(rate)))
}

fn build_filter(config: &LogConfig, overrides: &LogOverrides) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let level = overrides.level.as_deref().unwrap_or(&config.level);
    EnvFilter::try_new(level)
        .map_err(|e| AppError::settings(format!("invalid log level '{}': {}", level, e)))
}

fn stdout_layer(format: LogFormat, verbose: bool) -> BoxedLayer {
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(verbose)
            .with_file(verbose)
            .with_line_number(verbose)
            .boxed(),
    }
}
