use anyhow::{Context, Result};
use app_skeleton::app::{App, Component};
use app_skeleton::config::{AppConfig, LogFormat};
use app_skeleton::grpc::{GrpcServer, ServerSettings};
use app_skeleton::logging::{init_logging, LogOverrides};
use app_skeleton::{handlers, metrics};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "demo-server")]
#[command(about = "Demo gRPC service with an HTTP gateway and Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/demo_server.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the server")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<LogFormat>,
}

impl Args {
    fn log_overrides(&self) -> LogOverrides {
        let level = if self.debug {
            Some("debug")
        } else if self.verbose {
            Some("info")
        } else if self.quiet {
            Some("error")
        } else {
            None
        };

        LogOverrides {
            level: level.map(str::to_string),
            format: self.log_format,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let config = AppConfig::load_from_file(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config))?;

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    config.validate().context("invalid configuration")?;

    let _log_guard = init_logging(&config, &args.log_overrides())?;

    info!("Starting {} v{}", config.app_name, env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let app = App::builder(config.app_name.clone())
        .components(build_components(&config)?)
        .lifecycle(&config.lifecycle)
        .build()?;

    if let Err(e) = app.run().await {
        error!("{} exited with error: {}", config.app_name, e);
        return Err(e.into());
    }

    info!("{} stopped", config.app_name);
    Ok(())
}

/// Components in start order; they are stopped in reverse
fn build_components(config: &AppConfig) -> Result<Vec<Arc<dyn Component>>> {
    let mut components: Vec<Arc<dyn Component>> = Vec::new();

    if config.enable_metrics {
        let handle = metrics::setup_metrics_recorder()?;
        components.push(Arc::new(metrics::metrics_server(&config.metrics.addr, handle)?));
    }

    let mut server = GrpcServer::new(ServerSettings::from_config(config)?)?;
    if config.grpc.gateway.enabled {
        server.register_gateway_routes(handlers::router());
    }
    components.push(Arc::new(server));

    Ok(components)
}

fn print_default_config() -> Result<()> {
    println!("# demo-server configuration");
    println!("# Every key can be overridden with APP_<SECTION>__<KEY>, e.g. APP_GRPC__ADDR");
    println!();
    println!("{}", toml::to_string_pretty(&AppConfig::default())?);
    Ok(())
}
