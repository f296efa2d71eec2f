mod config;

use clap::{Args, Parser};
use config::{CommonConfig, Config, ConfigError, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
enum CliCommand {
    /// Runs the product composite together with its local downstream services
    Composite(CompositeArgs),
}

#[derive(Args)]
struct CompositeArgs {
    #[arg(long)]
    config_file_path: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("missing `composite` section in config")]
    MissingCompositeConfig,
    #[error("could not set up metrics: {0}")]
    Metrics(String),
    #[error(transparent)]
    Server(#[from] composite::errors::ServerError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

fn main() -> ExitCode {
    let cli = CliCommand::parse();

    match cli {
        CliCommand::Composite(args) => match run_composite(&args) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %e, "composite exited with error");
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        },
    }
}

fn run_composite(args: &CompositeArgs) -> Result<(), CliError> {
    let config = Config::from_file(&args.config_file_path)?;
    let _sentry = init_logging(config.common.logging.as_ref());
    init_metrics(&config.common)?;

    let composite_config = config.composite.ok_or(CliError::MissingCompositeConfig)?;

    tracing::info!("Starting composite");
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(composite::run(composite_config))?;

    Ok(())
}

/// Installs the tracing subscriber, plus the Sentry layer when a DSN is
/// configured. The returned guard flushes Sentry on drop.
fn init_logging(logging: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let guard = logging.map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .with(guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    guard
}

fn init_metrics(common: &CommonConfig) -> Result<(), CliError> {
    let Some(MetricsConfig {
        statsd_host,
        statsd_port,
        prefix,
    }) = &common.metrics
    else {
        tracing::info!("no metrics backend configured");
        return Ok(());
    };

    let recorder = StatsdBuilder::from(statsd_host.as_str(), *statsd_port)
        .build(Some(prefix.as_str()))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;

    shared::metrics_defs::describe_all(composite::metrics_defs::ALL_METRICS);
    tracing::info!(%statsd_host, statsd_port, "metrics enabled");
    Ok(())
}
