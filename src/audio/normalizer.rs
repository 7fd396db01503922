//! Brings artifacts into the format the engine expects, using ffmpeg.

use super::{AudioArtifact, AudioFormat};
use crate::engine::EngineInvoker;
use crate::error::{PipelineError, PipelineResult};
use crate::metrics;
use crate::transient::TransientScope;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct TranscoderSettings {
    pub executable: PathBuf,
    /// Format the matcher/ingester read.
    pub target_format: AudioFormat,
    /// VBR quality passed as `-q:a` (0 best, 9 worst).
    pub quality: u8,
    /// Extra ffmpeg arguments inserted before the output path.
    pub extra_args: Vec<String>,
}

impl Default for TranscoderSettings {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("ffmpeg"),
            target_format: AudioFormat::Mp3,
            quality: 2,
            extra_args: Vec::new(),
        }
    }
}

pub struct FormatNormalizer {
    invoker: Arc<EngineInvoker>,
    settings: TranscoderSettings,
}

impl FormatNormalizer {
    pub fn new(invoker: Arc<EngineInvoker>, settings: TranscoderSettings) -> Self {
        Self { invoker, settings }
    }

    pub fn target_format(&self) -> &AudioFormat {
        &self.settings.target_format
    }

    pub fn executable(&self) -> &std::path::Path {
        &self.settings.executable
    }

    /// Returns an artifact in the target format.
    ///
    /// Already-normalized artifacts come back unchanged without a subprocess.
    /// Otherwise the transcoded derivative replaces the original in `scope`.
    pub async fn normalize(
        &self,
        scope: &mut TransientScope,
        artifact: AudioArtifact,
    ) -> PipelineResult<AudioArtifact> {
        if artifact.format() == &self.settings.target_format {
            debug!(
                "{:?} already in {} format, skipping transcode",
                artifact.source_path(),
                self.settings.target_format
            );
            return Ok(artifact);
        }

        let output_path = scope.allocate("normalized", &self.settings.target_format);
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            artifact.source_path().to_string_lossy().to_string(),
            "-vn".to_string(), // No video
            "-ac".to_string(),
            "1".to_string(),
            "-q:a".to_string(),
            self.settings.quality.to_string(),
        ];
        args.extend(self.settings.extra_args.iter().cloned());
        args.push(output_path.to_string_lossy().to_string());

        info!(
            "Transcoding {:?} ({}) to {}",
            artifact.source_path(),
            artifact.format(),
            self.settings.target_format
        );
        let invocation = self
            .invoker
            .tool_invocation("transcoder", &self.settings.executable, args);
        let outcome = self.invoker.execute(invocation).await;

        let failure = if !outcome.launched {
            Some(outcome.standard_error.trim().to_string())
        } else if outcome.exit_status != 0 {
            Some(format!(
                "ffmpeg exited with status {}: {}",
                outcome.exit_status,
                outcome.standard_error.trim()
            ))
        } else if !has_content(&output_path).await {
            Some("ffmpeg produced no output file".to_string())
        } else {
            None
        };

        if let Some(reason) = failure {
            warn!("Transcode of {:?} failed: {}", artifact.source_path(), reason);
            metrics::record_transcode("failed");
            if let Err(e) = scope.discard(&output_path).await {
                warn!("Failed to remove partial output {:?}: {}", output_path, e);
            }
            return Err(PipelineError::Transcode(reason));
        }

        metrics::record_transcode("ok");
        let normalized = artifact.derive(output_path, self.settings.target_format.clone());
        scope.supersede(&artifact, &normalized).await?;
        Ok(normalized)
    }
}

async fn has_content(path: &std::path::Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}
