use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use seektune::config::{AppConfig, CliConfig, FileConfig};
use seektune::metrics;
use seektune::orchestrator::RequestOrchestrator;
use seektune::server::{run_server, RequestsLoggingLevel, ServerConfig};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Values in it override the flags below.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Root directory for per-request scratch files.
    #[clap(long, value_parser = parse_path)]
    pub temp_dir: Option<PathBuf>,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// Directory the engines run in; relative engine paths resolve against it.
    #[clap(long, value_parser = parse_path)]
    pub working_dir: Option<PathBuf>,

    /// Matcher executable ("shazam" engine).
    #[clap(long)]
    pub matcher: Option<PathBuf>,

    /// Ingester executable ("add" engine).
    #[clap(long)]
    pub ingester: Option<PathBuf>,

    /// Transcoder executable, also used for recording unless configured otherwise.
    #[clap(long)]
    pub ffmpeg: Option<PathBuf>,

    /// Kill engine processes after this many seconds. Unset waits forever.
    #[clap(long)]
    pub engine_timeout_sec: Option<u64>,

    /// SQLite catalog database to list songs from.
    #[clap(long, value_parser = parse_path)]
    pub catalog_db: Option<PathBuf>,

    /// HTTP endpoint returning the catalog as a JSON array.
    #[clap(long)]
    pub catalog_url: Option<String>,

    /// Timeout in seconds for HTTP and MongoDB catalog requests.
    #[clap(long, default_value_t = 10)]
    pub catalog_timeout_sec: u64,

    /// Largest accepted upload, in megabytes.
    #[clap(long, default_value_t = 100)]
    pub max_upload_mb: u64,
}

impl From<&CliArgs> for CliConfig {
    fn from(args: &CliArgs) -> Self {
        CliConfig {
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            temp_dir: args.temp_dir.clone(),
            frontend_dir_path: args.frontend_dir_path.clone(),
            working_dir: args.working_dir.clone(),
            matcher: args.matcher.clone(),
            ingester: args.ingester.clone(),
            ffmpeg: args.ffmpeg.clone(),
            engine_timeout_sec: args.engine_timeout_sec,
            catalog_db: args.catalog_db.clone(),
            catalog_url: args.catalog_url.clone(),
            catalog_timeout_sec: args.catalog_timeout_sec,
            max_upload_mb: args.max_upload_mb,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}...", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&CliConfig::from(&cli_args), file_config)?;

    info!("Initializing metrics...");
    metrics::init_metrics();

    let orchestrator = RequestOrchestrator::from_config(&config)?;
    let transient = orchestrator.transient_root();
    transient
        .init()
        .await
        .with_context(|| format!("Failed to create temp dir {:?}", transient.path()))?;
    match transient.sweep_stale(config.stale_scope_max_age).await {
        Ok(0) => {}
        Ok(count) => info!("Removed {} stale request directories", count),
        Err(e) => warn!("Failed to sweep stale request directories: {}", e),
    }

    let status = orchestrator.engine_status();
    if !status.matcher {
        warn!("Matcher not found: {:?}", config.engine.matcher_path);
    }
    if !status.ingester {
        warn!("Ingester not found: {:?}", config.engine.ingester_path);
    }
    if !status.transcoder {
        warn!("Transcoder not found: {:?}", config.transcoder.executable);
    }

    let server_config = ServerConfig {
        requests_logging_level: config.logging_level.clone(),
        port: config.port,
        metrics_port: config.metrics_port,
        frontend_dir_path: config.frontend_dir_path.clone(),
        max_body_bytes: usize::try_from(config.limits.max_upload_bytes)
            .unwrap_or(usize::MAX)
            .saturating_add(1024 * 1024),
        allow_local_paths: config.allow_local_paths,
    };

    info!("Ready to serve at port {}!", config.port);
    info!("Metrics available at port {}!", config.metrics_port);
    run_server(server_config, Arc::new(orchestrator)).await
}
