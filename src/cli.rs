use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli_style;
use cli_style::get_styles;

use seektune::audio::{AudioSource, CaptureRequest};
use seektune::config::{AppConfig, CliConfig, FileConfig};
use seektune::engine::{IngestResult, MatchResult};
use seektune::metadata::SongMetadata;
use seektune::orchestrator::{RequestOrchestrator, WorkflowReport};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(styles=get_styles(), name = "seektune-cli")]
struct CliArgs {
    /// Path to a TOML config file, same format as the server's.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory the engines run in.
    #[clap(long, value_parser = parse_path)]
    pub working_dir: Option<PathBuf>,

    /// Matcher executable.
    #[clap(long)]
    pub matcher: Option<PathBuf>,

    /// Ingester executable.
    #[clap(long)]
    pub ingester: Option<PathBuf>,

    /// Transcoder/recorder executable.
    #[clap(long)]
    pub ffmpeg: Option<PathBuf>,

    /// Root directory for scratch files.
    #[clap(long, value_parser = parse_path)]
    pub temp_dir: Option<PathBuf>,

    /// SQLite catalog database.
    #[clap(long, value_parser = parse_path)]
    pub catalog_db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Identifies an audio file on disk.
    Identify {
        #[clap(value_parser = parse_path)]
        file: PathBuf,
    },

    /// Records from the input device and identifies the clip. Ctrl-C cancels.
    Record {
        /// Recording length in seconds.
        #[clap(short, long)]
        duration: Option<f64>,

        #[clap(long)]
        sample_rate: Option<u32>,
    },

    /// Adds an audio file on disk to the catalog.
    Add {
        #[clap(value_parser = parse_path)]
        file: PathBuf,

        #[clap(long)]
        title: String,

        #[clap(long)]
        artist: String,

        /// External identifier forwarded to the ingester.
        #[clap(long)]
        source_id: Option<String>,
    },

    /// Lists the songs in the catalog.
    Catalog,
}

impl From<&CliArgs> for CliConfig {
    fn from(args: &CliArgs) -> Self {
        CliConfig {
            temp_dir: args.temp_dir.clone(),
            working_dir: args.working_dir.clone(),
            matcher: args.matcher.clone(),
            ingester: args.ingester.clone(),
            ffmpeg: args.ffmpeg.clone(),
            catalog_db: args.catalog_db.clone(),
            ..Default::default()
        }
    }
}

fn spinner(message: String) -> Result<ProgressBar> {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")?);
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    Ok(bar)
}

/// Resolves when `signal` fires. If the handler can't be installed, never resolves.
async fn cancel_on<F>(signal: F)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::warn!("Signal handler unavailable, recording can't be cancelled: {}", e);
        std::future::pending::<()>().await;
    }
}

fn print_match(report: WorkflowReport<MatchResult>) -> Result<()> {
    match report.into_result() {
        Ok(MatchResult::Found(details)) => {
            println!("{}", details);
            Ok(())
        }
        Ok(failure @ MatchResult::EngineFailure(_)) => bail!("{}", failure.message()),
        Ok(not_found) => {
            println!("{}", not_found.message());
            Ok(())
        }
        Err(e) => bail!("{} ({})", e.user_message(), e),
    }
}

fn print_ingest(report: WorkflowReport<IngestResult>) -> Result<()> {
    match report.into_result() {
        Ok(failure @ IngestResult::IngestFailure(_)) => bail!("{}", failure.message()),
        Ok(ingested) => {
            println!("{}", ingested.message());
            Ok(())
        }
        Err(e) => bail!("{} ({})", e.user_message(), e),
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let file_config = args.config.as_deref().map(FileConfig::load).transpose()?;
    let config = AppConfig::resolve(&CliConfig::from(&args), file_config)?;
    let orchestrator = RequestOrchestrator::from_config(&config)?;
    orchestrator
        .transient_root()
        .init()
        .await
        .context("Failed to create temp dir")?;

    match args.command {
        Command::Identify { file } => {
            let bar = spinner(format!("Identifying {}", file.display()))?;
            let report = orchestrator.identify_traced(AudioSource::LocalFile(file)).await;
            bar.finish_and_clear();
            print_match(report)
        }
        Command::Record {
            duration,
            sample_rate,
        } => {
            let defaults = orchestrator.capture_defaults();
            let duration = match duration {
                Some(secs) => Duration::try_from_secs_f64(secs)
                    .with_context(|| format!("Invalid duration: {}", secs))?,
                None => defaults.duration,
            };
            let request = CaptureRequest {
                duration,
                sample_rate: sample_rate.unwrap_or(defaults.sample_rate),
            };
            let bar = spinner(format!("Recording {:.1}s, then identifying", duration.as_secs_f64()))?;
            let cancel = cancel_on(tokio::signal::ctrl_c());
            let report = orchestrator
                .identify_cancellable(AudioSource::Capture(request), cancel)
                .await;
            bar.finish_and_clear();
            print_match(report)
        }
        Command::Add {
            file,
            title,
            artist,
            source_id,
        } => {
            let metadata = SongMetadata::new(&title, &artist)
                .map_err(|e| anyhow::anyhow!(e.user_message()))?
                .with_source_id(source_id.as_deref());
            let bar = spinner(format!("Adding \"{}\" by {}", metadata.title(), metadata.artist()))?;
            let report = orchestrator
                .add_song_traced(AudioSource::LocalFile(file), metadata)
                .await;
            bar.finish_and_clear();
            print_ingest(report)
        }
        Command::Catalog => {
            let listing = orchestrator.list_catalog().await;
            if let Some(e) = listing.error {
                bail!("{} ({})", e.user_message(), e);
            }
            if listing.entries.is_empty() {
                println!("The catalog is empty.");
            }
            for entry in listing.entries {
                println!("{}  {} - {}", entry.id, entry.artist, entry.title);
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    run(args).await
}
