use super::Secret;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub temp_dir: Option<String>,
    pub frontend_dir_path: Option<String>,
    pub max_upload_mb: Option<u64>,
    pub stale_scope_max_age_sec: Option<u64>,
    pub allow_local_paths: Option<bool>,

    // Sections
    pub engine: Option<EngineConfig>,
    pub transcoder: Option<TranscoderConfig>,
    pub capture: Option<CaptureConfig>,
    pub catalog: Option<CatalogConfig>,
    pub secrets: Option<SecretsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub matcher_path: Option<String>,
    pub ingester_path: Option<String>,
    pub working_dir: Option<String>,
    /// Environment variable the catalog connection string is passed in.
    pub connection_env_var: Option<String>,
    pub timeout_sec: Option<u64>,
    pub no_match_exit_code: Option<i32>,
    pub env: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct TranscoderConfig {
    pub executable: Option<String>,
    /// File extension of the target format, e.g. "mp3".
    pub target_format: Option<String>,
    pub quality: Option<u8>,
    /// Shell-style string, split into arguments.
    pub extra_args: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CaptureConfig {
    pub executable: Option<String>,
    pub input_format: Option<String>,
    pub device: Option<String>,
    pub extra_args: Option<String>,
    pub duration_sec: Option<u64>,
    pub sample_rate: Option<u32>,
    pub max_duration_sec: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CatalogConfig {
    /// "mongo", "sqlite", "http" or "none". Inferred from the other fields when unset.
    pub backend: Option<String>,
    pub db_path: Option<String>,
    /// MongoDB database holding the `songs` collection.
    pub database: Option<String>,
    pub url: Option<String>,
    pub timeout_sec: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SecretsConfig {
    /// Catalog connection string handed to the engines.
    pub catalog_uri: Option<Secret>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
