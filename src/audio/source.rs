//! Turns an [`AudioSource`] into an [`AudioArtifact`].

use super::{ArtifactOrigin, AudioArtifact, AudioFormat, AudioSource, CaptureDevice, CaptureHandle, CaptureRequest};
use crate::error::{PipelineError, PipelineResult};
use crate::transient::TransientScope;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SourceLimits {
    pub max_upload_bytes: u64,
    pub max_capture_duration: Duration,
}

impl Default for SourceLimits {
    fn default() -> Self {
        Self {
            max_upload_bytes: 100 * 1024 * 1024,
            max_capture_duration: Duration::from_secs(60),
        }
    }
}

pub struct SourceAdapter {
    capture: Arc<dyn CaptureDevice>,
    limits: SourceLimits,
}

impl SourceAdapter {
    pub fn new(capture: Arc<dyn CaptureDevice>, limits: SourceLimits) -> Self {
        Self { capture, limits }
    }

    pub fn limits(&self) -> &SourceLimits {
        &self.limits
    }

    /// Checks a source without touching the filesystem beyond a stat.
    pub fn validate(&self, source: &AudioSource) -> PipelineResult<()> {
        match source {
            AudioSource::Capture(request) => {
                if request.duration.is_zero() {
                    return Err(PipelineError::Validation(
                        "capture duration must be greater than zero".to_string(),
                    ));
                }
                if request.duration > self.limits.max_capture_duration {
                    return Err(PipelineError::Validation(format!(
                        "capture duration {:?} exceeds the maximum of {:?}",
                        request.duration, self.limits.max_capture_duration
                    )));
                }
                if request.sample_rate == 0 {
                    return Err(PipelineError::Validation(
                        "sample rate must be greater than zero".to_string(),
                    ));
                }
                Ok(())
            }
            AudioSource::Upload { bytes, .. } => {
                if bytes.is_empty() {
                    return Err(PipelineError::Validation("uploaded file is empty".to_string()));
                }
                let size = bytes.len() as u64;
                if size > self.limits.max_upload_bytes {
                    return Err(PipelineError::Validation(format!(
                        "file too large: {} bytes (max: {})",
                        size, self.limits.max_upload_bytes
                    )));
                }
                Ok(())
            }
            AudioSource::LocalFile(path) => validate_local(path),
        }
    }

    /// Produces the artifact for `source`, writing into `scope` where needed.
    pub async fn acquire(
        &self,
        scope: &mut TransientScope,
        source: AudioSource,
    ) -> PipelineResult<AudioArtifact> {
        self.validate(&source)?;
        match source {
            AudioSource::Capture(request) => self.capture_from_device(scope, request).await,
            AudioSource::Upload { bytes, filename } => {
                self.accept_upload(scope, &bytes, filename.as_deref()).await
            }
            AudioSource::LocalFile(path) => self.accept_local(&path),
        }
    }

    /// Starts a recording into the scope and hands back its handle.
    pub async fn start_capture(
        &self,
        scope: &mut TransientScope,
        request: CaptureRequest,
    ) -> PipelineResult<CaptureHandle> {
        let output = scope.allocate("capture", &AudioFormat::Wav);
        self.capture.start(output, request).await
    }

    /// Records for the full requested duration.
    pub async fn capture_from_device(
        &self,
        scope: &mut TransientScope,
        request: CaptureRequest,
    ) -> PipelineResult<AudioArtifact> {
        self.start_capture(scope, request).await?.wait().await
    }

    /// Writes uploaded bytes into the scope as-is; no transcoding here.
    pub async fn accept_upload(
        &self,
        scope: &mut TransientScope,
        bytes: &[u8],
        filename: Option<&str>,
    ) -> PipelineResult<AudioArtifact> {
        if bytes.is_empty() {
            return Err(PipelineError::Validation("uploaded file is empty".to_string()));
        }

        // Magic bytes first; the client's filename is only a hint.
        let format = match AudioFormat::sniff(bytes) {
            AudioFormat::Unknown => filename
                .map(|f| AudioFormat::from_path(Path::new(f)))
                .unwrap_or(AudioFormat::Unknown),
            sniffed => sniffed,
        };

        let path = scope.allocate("upload", &format);
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        debug!("Stored {} uploaded bytes as {:?} ({})", bytes.len(), path, format);

        Ok(AudioArtifact::new(path, format, ArtifactOrigin::Uploaded))
    }

    /// References a caller-owned file in place.
    pub fn accept_local(&self, path: &Path) -> PipelineResult<AudioArtifact> {
        validate_local(path)?;
        Ok(AudioArtifact::new(
            path,
            AudioFormat::from_path(path),
            ArtifactOrigin::Local,
        ))
    }
}

fn validate_local(path: &Path) -> PipelineResult<()> {
    if !path.is_file() {
        return Err(PipelineError::Validation(format!(
            "audio file not found: {}",
            path.display()
        )));
    }
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if !AudioFormat::is_supported_filename(name) {
        return Err(PipelineError::Validation(format!(
            "unsupported audio file type: {}",
            path.display()
        )));
    }
    Ok(())
}
