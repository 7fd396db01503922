mod file_config;
mod secret;

pub use file_config::{
    CaptureConfig, CatalogConfig, EngineConfig, FileConfig, SecretsConfig, TranscoderConfig,
};
pub use secret::Secret;

use crate::audio::{AudioFormat, CaptureRequest, CaptureSettings, SourceLimits, TranscoderSettings};
use crate::catalog::{
    CatalogReader, HttpCatalogReader, MongoCatalogReader, NullCatalogReader, SqliteCatalogReader,
};
use crate::engine::{EngineProtocol, EngineSettings};
use crate::server::RequestsLoggingLevel;
use anyhow::{anyhow, bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub temp_dir: Option<PathBuf>,
    pub frontend_dir_path: Option<String>,
    pub working_dir: Option<PathBuf>,
    pub matcher: Option<PathBuf>,
    pub ingester: Option<PathBuf>,
    pub ffmpeg: Option<PathBuf>,
    pub engine_timeout_sec: Option<u64>,
    pub catalog_db: Option<PathBuf>,
    pub catalog_url: Option<String>,
    pub catalog_timeout_sec: u64,
    pub max_upload_mb: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            metrics_port: 9091,
            logging_level: RequestsLoggingLevel::default(),
            temp_dir: None,
            frontend_dir_path: None,
            working_dir: None,
            matcher: None,
            ingester: None,
            ffmpeg: None,
            engine_timeout_sec: None,
            catalog_db: None,
            catalog_url: None,
            catalog_timeout_sec: 10,
            max_upload_mb: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub temp_dir: PathBuf,
    pub frontend_dir_path: Option<String>,
    pub stale_scope_max_age: Duration,
    pub allow_local_paths: bool,

    // Component settings
    pub engine: EngineSettings,
    pub transcoder: TranscoderSettings,
    pub capture: CaptureSettings,
    pub capture_defaults: CaptureRequest,
    pub limits: SourceLimits,
    pub catalog: CatalogSettings,
}

/// Which catalog store to read for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSettings {
    None,
    Sqlite { db_path: PathBuf },
    Http { url: String, timeout_sec: u64 },
    Mongo {
        uri: Secret,
        database: Option<String>,
        timeout_sec: u64,
    },
}

impl CatalogSettings {
    pub fn build_reader(&self) -> Result<Arc<dyn CatalogReader>> {
        Ok(match self {
            CatalogSettings::None => Arc::new(NullCatalogReader),
            CatalogSettings::Sqlite { db_path } => Arc::new(SqliteCatalogReader::new(db_path)),
            CatalogSettings::Http { url, timeout_sec } => {
                Arc::new(HttpCatalogReader::new(url.clone(), *timeout_sec)?)
            }
            CatalogSettings::Mongo {
                uri,
                database,
                timeout_sec,
            } => Arc::new(MongoCatalogReader::new(
                uri.clone(),
                database.clone(),
                *timeout_sec,
            )),
        })
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);
        if port == metrics_port {
            bail!("port and metrics_port must differ (both are {})", port);
        }

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let temp_dir = file
            .temp_dir
            .map(PathBuf::from)
            .or_else(|| cli.temp_dir.clone())
            .unwrap_or_else(|| std::env::temp_dir().join("seektune"));
        if temp_dir.exists() && !temp_dir.is_dir() {
            bail!("temp_dir is not a directory: {:?}", temp_dir);
        }

        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());

        let stale_scope_max_age =
            Duration::from_secs(file.stale_scope_max_age_sec.unwrap_or(3600));

        let allow_local_paths = file.allow_local_paths.unwrap_or(false);

        let max_upload_mb = file.max_upload_mb.unwrap_or(cli.max_upload_mb);
        if max_upload_mb == 0 {
            bail!("max_upload_mb must be greater than zero");
        }

        // Engine settings - TOML [engine] section over CLI over defaults
        let engine_file = file.engine.unwrap_or_default();
        let engine_defaults = EngineSettings::default();
        let working_dir = engine_file
            .working_dir
            .map(PathBuf::from)
            .or_else(|| cli.working_dir.clone())
            .unwrap_or(engine_defaults.working_dir);
        if !working_dir.is_dir() {
            bail!("Engine working directory does not exist: {:?}", working_dir);
        }
        let connection_secret = file
            .secrets
            .and_then(|s| s.catalog_uri)
            .filter(|s| !s.is_empty());
        let engine = EngineSettings {
            matcher_path: engine_file
                .matcher_path
                .map(PathBuf::from)
                .or_else(|| cli.matcher.clone())
                .unwrap_or(engine_defaults.matcher_path),
            ingester_path: engine_file
                .ingester_path
                .map(PathBuf::from)
                .or_else(|| cli.ingester.clone())
                .unwrap_or(engine_defaults.ingester_path),
            working_dir: working_dir.clone(),
            connection_env_var: engine_file
                .connection_env_var
                .unwrap_or(engine_defaults.connection_env_var),
            connection_secret,
            extra_env: engine_file.env.unwrap_or_default(),
            timeout: engine_file
                .timeout_sec
                .or(cli.engine_timeout_sec)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            protocol: EngineProtocol {
                no_match_exit_code: engine_file.no_match_exit_code,
            },
        };
        if engine.connection_env_var.trim().is_empty() {
            bail!("engine.connection_env_var must not be empty");
        }

        // Transcoder settings
        let transcoder_file = file.transcoder.unwrap_or_default();
        let transcoder_defaults = TranscoderSettings::default();
        let target_format = match transcoder_file.target_format {
            Some(ext) => match AudioFormat::from_extension(&ext) {
                AudioFormat::Unknown => bail!("Unsupported transcoder target format: {}", ext),
                format => format,
            },
            None => transcoder_defaults.target_format,
        };
        let quality = transcoder_file.quality.unwrap_or(transcoder_defaults.quality);
        if quality > 9 {
            bail!("transcoder.quality must be between 0 and 9, got {}", quality);
        }
        let ffmpeg = transcoder_file
            .executable
            .map(PathBuf::from)
            .or_else(|| cli.ffmpeg.clone())
            .unwrap_or(transcoder_defaults.executable);
        let transcoder = TranscoderSettings {
            executable: ffmpeg.clone(),
            target_format,
            quality,
            extra_args: split_args("transcoder.extra_args", transcoder_file.extra_args)?,
        };

        // Capture settings - the recorder defaults to the same ffmpeg binary
        let capture_file = file.capture.unwrap_or_default();
        let capture_defaults = CaptureSettings::default();
        let capture = CaptureSettings {
            executable: capture_file.executable.map(PathBuf::from).unwrap_or(ffmpeg),
            input_format: capture_file
                .input_format
                .unwrap_or(capture_defaults.input_format),
            device: capture_file.device.unwrap_or(capture_defaults.device),
            extra_args: split_args("capture.extra_args", capture_file.extra_args)?,
        };
        let request_defaults = CaptureRequest::default();
        let capture_request = CaptureRequest {
            duration: capture_file
                .duration_sec
                .map(Duration::from_secs)
                .unwrap_or(request_defaults.duration),
            sample_rate: capture_file.sample_rate.unwrap_or(request_defaults.sample_rate),
        };
        let limits = SourceLimits {
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            max_capture_duration: capture_file
                .max_duration_sec
                .map(Duration::from_secs)
                .unwrap_or(SourceLimits::default().max_capture_duration),
        };
        if capture_request.duration.is_zero() || capture_request.duration > limits.max_capture_duration {
            bail!(
                "capture.duration_sec must be between 1 and {} seconds",
                limits.max_capture_duration.as_secs()
            );
        }
        if capture_request.sample_rate == 0 {
            bail!("capture.sample_rate must be greater than zero");
        }

        let catalog = resolve_catalog(
            cli,
            file.catalog.unwrap_or_default(),
            &working_dir,
            engine.connection_secret.as_ref(),
        )?;

        Ok(Self {
            port,
            metrics_port,
            logging_level,
            temp_dir,
            frontend_dir_path,
            stale_scope_max_age,
            allow_local_paths,
            engine,
            transcoder,
            capture,
            capture_defaults: capture_request,
            limits,
            catalog,
        })
    }
}

fn resolve_catalog(
    cli: &CliConfig,
    catalog_file: CatalogConfig,
    working_dir: &std::path::Path,
    connection_secret: Option<&Secret>,
) -> Result<CatalogSettings> {
    let db_path = catalog_file
        .db_path
        .map(PathBuf::from)
        .or_else(|| cli.catalog_db.clone())
        .map(|p| if p.is_relative() { working_dir.join(p) } else { p });
    let url = catalog_file.url.or_else(|| cli.catalog_url.clone());
    let timeout_sec = catalog_file.timeout_sec.unwrap_or(cli.catalog_timeout_sec);

    let backend = match catalog_file.backend {
        Some(backend) => backend.to_lowercase(),
        None if url.is_some() => "http".to_string(),
        None if db_path.is_some() => "sqlite".to_string(),
        None if connection_secret.is_some() => "mongo".to_string(),
        None => "none".to_string(),
    };

    match backend.as_str() {
        "none" => Ok(CatalogSettings::None),
        "sqlite" => {
            let db_path = db_path.ok_or_else(|| {
                anyhow!("catalog.db_path must be specified via --catalog-db or in config file")
            })?;
            Ok(CatalogSettings::Sqlite { db_path })
        }
        "http" => {
            let url = url.ok_or_else(|| {
                anyhow!("catalog.url must be specified via --catalog-url or in config file")
            })?;
            if !url.starts_with("http://") && !url.starts_with("https://") {
                bail!("catalog.url must be an http(s) URL: {}", url);
            }
            Ok(CatalogSettings::Http { url, timeout_sec })
        }
        "mongo" | "mongodb" => {
            let uri = connection_secret.cloned().ok_or_else(|| {
                anyhow!("the mongo catalog backend needs [secrets] catalog_uri in the config file")
            })?;
            Ok(CatalogSettings::Mongo {
                uri,
                database: catalog_file.database,
                timeout_sec,
            })
        }
        other => bail!("Unknown catalog backend: {}", other),
    }
}

fn split_args(field: &str, raw: Option<String>) -> Result<Vec<String>> {
    match raw {
        None => Ok(Vec::new()),
        Some(raw) => shlex::split(&raw).ok_or_else(|| anyhow!("{} is not a valid argument list: {}", field, raw)),
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cli_in(dir: &TempDir) -> CliConfig {
        CliConfig {
            working_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_logging_level() {
        assert!(matches!(
            parse_logging_level("none"),
            Some(RequestsLoggingLevel::None)
        ));
        assert!(matches!(
            parse_logging_level("HEADERS"),
            Some(RequestsLoggingLevel::Headers)
        ));
        assert!(parse_logging_level("body").is_none());
    }

    #[test]
    fn test_resolve_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::resolve(&cli_in(&dir), None).unwrap();

        assert_eq!(config.port, 3001);
        assert_eq!(config.metrics_port, 9091);
        assert_eq!(config.engine.matcher_path, PathBuf::from("./shazam"));
        assert_eq!(config.engine.ingester_path, PathBuf::from("./add"));
        assert_eq!(config.engine.connection_env_var, "MONGO_URI");
        assert!(config.engine.connection_secret.is_none());
        assert!(config.engine.timeout.is_none());
        assert_eq!(config.transcoder.target_format, AudioFormat::Mp3);
        assert_eq!(config.transcoder.quality, 2);
        assert_eq!(config.capture_defaults.duration, Duration::from_secs(8));
        assert_eq!(config.capture_defaults.sample_rate, 44100);
        assert_eq!(config.limits.max_upload_bytes, 100 * 1024 * 1024);
        assert_eq!(config.catalog, CatalogSettings::None);
        assert!(!config.allow_local_paths);
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let dir = TempDir::new().unwrap();
        let cli = CliConfig {
            port: 3001,
            matcher: Some(PathBuf::from("/cli/shazam")),
            ingester: Some(PathBuf::from("/cli/add")),
            engine_timeout_sec: Some(60),
            ..cli_in(&dir)
        };
        let file_config = FileConfig {
            port: Some(4000),
            logging_level: Some("none".to_string()),
            engine: Some(EngineConfig {
                matcher_path: Some("/toml/shazam".to_string()),
                timeout_sec: Some(5),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.logging_level, RequestsLoggingLevel::None);
        assert_eq!(config.engine.matcher_path, PathBuf::from("/toml/shazam"));
        // CLI value used when TOML doesn't specify
        assert_eq!(config.engine.ingester_path, PathBuf::from("/cli/add"));
        assert_eq!(config.engine.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.metrics_port, 9091);
    }

    #[test]
    fn test_resolve_secret_and_env() {
        let dir = TempDir::new().unwrap();
        let mut env = std::collections::BTreeMap::new();
        env.insert("DB_TYPE".to_string(), "mongo".to_string());
        let file_config = FileConfig {
            engine: Some(EngineConfig {
                connection_env_var: Some("CATALOG_URI".to_string()),
                env: Some(env),
                no_match_exit_code: Some(2),
                ..Default::default()
            }),
            secrets: Some(SecretsConfig {
                catalog_uri: Some(Secret::new("mongodb://localhost")),
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli_in(&dir), Some(file_config)).unwrap();

        assert_eq!(config.engine.connection_env_var, "CATALOG_URI");
        assert_eq!(
            config.engine.connection_secret.as_ref().map(Secret::expose),
            Some("mongodb://localhost")
        );
        assert_eq!(config.engine.extra_env.get("DB_TYPE").map(String::as_str), Some("mongo"));
        assert_eq!(config.engine.protocol.no_match_exit_code, Some(2));
        assert!(!format!("{:?}", config).contains("mongodb://localhost"));
    }

    #[test]
    fn test_resolve_extra_args_split() {
        let dir = TempDir::new().unwrap();
        let file_config = FileConfig {
            transcoder: Some(TranscoderConfig {
                extra_args: Some("-af 'volume=2, highpass=f=200'".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli_in(&dir), Some(file_config)).unwrap();

        assert_eq!(
            config.transcoder.extra_args,
            vec!["-af".to_string(), "volume=2, highpass=f=200".to_string()]
        );
    }

    #[test]
    fn test_resolve_unbalanced_extra_args_error() {
        let dir = TempDir::new().unwrap();
        let file_config = FileConfig {
            capture: Some(CaptureConfig {
                extra_args: Some("-af 'oops".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let result = AppConfig::resolve(&cli_in(&dir), Some(file_config));
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("capture.extra_args"));
    }

    #[test]
    fn test_resolve_catalog_backend_inferred() {
        let dir = TempDir::new().unwrap();
        let cli = CliConfig {
            catalog_db: Some(PathBuf::from("db/songs.db")),
            ..cli_in(&dir)
        };
        let config = AppConfig::resolve(&cli, None).unwrap();
        assert_eq!(
            config.catalog,
            CatalogSettings::Sqlite {
                db_path: dir.path().join("db/songs.db")
            }
        );

        let cli = CliConfig {
            catalog_url: Some("http://localhost:8080/songs".to_string()),
            ..cli_in(&dir)
        };
        let config = AppConfig::resolve(&cli, None).unwrap();
        assert!(matches!(config.catalog, CatalogSettings::Http { .. }));
    }

    #[test]
    fn test_resolve_catalog_mongo_uses_connection_secret() {
        let dir = TempDir::new().unwrap();
        let file_config = FileConfig {
            catalog: Some(CatalogConfig {
                database: Some("songs-db".to_string()),
                ..Default::default()
            }),
            secrets: Some(SecretsConfig {
                catalog_uri: Some(Secret::new("mongodb://localhost:27017")),
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli_in(&dir), Some(file_config)).unwrap();

        assert_eq!(
            config.catalog,
            CatalogSettings::Mongo {
                uri: Secret::new("mongodb://localhost:27017"),
                database: Some("songs-db".to_string()),
                timeout_sec: 10,
            }
        );
    }

    #[test]
    fn test_resolve_catalog_mongo_without_secret_error() {
        let dir = TempDir::new().unwrap();
        let file_config = FileConfig {
            catalog: Some(CatalogConfig {
                backend: Some("mongo".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli_in(&dir), Some(file_config));
        assert!(result.unwrap_err().to_string().contains("catalog_uri"));
    }

    #[test]
    fn test_resolve_catalog_backend_without_location_error() {
        let dir = TempDir::new().unwrap();
        let file_config = FileConfig {
            catalog: Some(CatalogConfig {
                backend: Some("http".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli_in(&dir), Some(file_config));
        assert!(result.unwrap_err().to_string().contains("catalog.url"));
    }

    #[test]
    fn test_resolve_invalid_values() {
        let dir = TempDir::new().unwrap();

        let bad_format = FileConfig {
            transcoder: Some(TranscoderConfig {
                target_format: Some("xyz".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli_in(&dir), Some(bad_format)).is_err());

        let bad_quality = FileConfig {
            transcoder: Some(TranscoderConfig {
                quality: Some(12),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli_in(&dir), Some(bad_quality)).is_err());

        let same_ports = CliConfig {
            port: 9000,
            metrics_port: 9000,
            ..cli_in(&dir)
        };
        assert!(AppConfig::resolve(&same_ports, None).is_err());
    }

    #[test]
    fn test_resolve_missing_working_dir_error() {
        let cli = CliConfig {
            working_dir: Some(PathBuf::from("/nonexistent/path/that/should/not/exist")),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.unwrap_err().to_string().contains("does not exist"));
    }
}
