//! Live recording from an input device through an external recorder process.

use super::{ArtifactOrigin, AudioArtifact, AudioFormat, CaptureRequest};
use crate::engine::resolve_executable;
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Anything that can record a fixed-length mono clip into a file.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Starts recording into `output`. The returned handle decides whether
    /// to wait the recording out or cancel it.
    async fn start(&self, output: PathBuf, request: CaptureRequest) -> PipelineResult<CaptureHandle>;
}

/// An in-flight (or already finished) recording.
///
/// Dropping a handle that was neither awaited nor cancelled stops the
/// recorder; the partial file is left to the owning scope.
pub struct CaptureHandle {
    output: PathBuf,
    request: CaptureRequest,
    recorder: Option<Child>,
}

impl CaptureHandle {
    fn recording(output: PathBuf, request: CaptureRequest, recorder: Child) -> Self {
        Self {
            output,
            request,
            recorder: Some(recorder),
        }
    }

    /// A handle for a recording that was written synchronously into `output`.
    pub fn finished(output: PathBuf, request: CaptureRequest) -> Self {
        Self {
            output,
            request,
            recorder: None,
        }
    }

    pub fn output(&self) -> &std::path::Path {
        &self.output
    }

    /// Waits for the recording to complete.
    pub async fn wait(mut self) -> PipelineResult<AudioArtifact> {
        if let Some(recorder) = self.recorder.take() {
            let output = recorder
                .wait_with_output()
                .await
                .map_err(|e| PipelineError::Device(format!("recorder failed: {}", e)))?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                remove_partial(&self.output).await;
                return Err(PipelineError::Device(format!(
                    "recorder exited with status {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                )));
            }
        }

        let len = tokio::fs::metadata(&self.output)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if len == 0 {
            remove_partial(&self.output).await;
            return Err(PipelineError::Device("recorder produced no audio".to_string()));
        }

        debug!("Captured {} bytes into {:?}", len, self.output);
        Ok(
            AudioArtifact::new(self.output.clone(), AudioFormat::Wav, ArtifactOrigin::Captured)
                .with_duration_hint(self.request.duration),
        )
    }

    /// Stops the recording and removes whatever was written.
    pub async fn cancel(mut self) -> PipelineResult<()> {
        if let Some(mut recorder) = self.recorder.take() {
            if let Err(e) = recorder.kill().await {
                warn!("Failed to stop recorder: {}", e);
            }
        }
        remove_partial(&self.output).await;
        info!("Capture into {:?} cancelled", self.output);
        Ok(())
    }
}

async fn remove_partial(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove partial capture {:?}: {}", path, e);
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub executable: PathBuf,
    /// ffmpeg input format (`-f`), e.g. "alsa", "pulse", "avfoundation".
    pub input_format: String,
    /// Input device name (`-i`).
    pub device: String,
    pub extra_args: Vec<String>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("ffmpeg"),
            input_format: "alsa".to_string(),
            device: "default".to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// Records through an ffmpeg-compatible command line into 16-bit mono WAV.
pub struct CommandCaptureDevice {
    settings: CaptureSettings,
    working_dir: PathBuf,
}

impl CommandCaptureDevice {
    pub fn new(settings: CaptureSettings, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            working_dir: working_dir.into(),
        }
    }

    fn arguments(&self, output: &std::path::Path, request: &CaptureRequest) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            self.settings.input_format.clone(),
            "-i".to_string(),
            self.settings.device.clone(),
            "-ac".to_string(),
            "1".to_string(),
            "-ar".to_string(),
            request.sample_rate.to_string(),
            "-t".to_string(),
            format!("{:.3}", request.duration.as_secs_f64()),
            "-c:a".to_string(),
            "pcm_s16le".to_string(),
        ];
        args.extend(self.settings.extra_args.iter().cloned());
        args.push("-y".to_string());
        args.push(output.to_string_lossy().to_string());
        args
    }
}

#[async_trait]
impl CaptureDevice for CommandCaptureDevice {
    async fn start(&self, output: PathBuf, request: CaptureRequest) -> PipelineResult<CaptureHandle> {
        let recorder = resolve_executable(&self.settings.executable, &self.working_dir).ok_or_else(|| {
            PipelineError::Device(format!(
                "recorder not found or not executable: {}",
                self.settings.executable.display()
            ))
        })?;

        info!(
            "Recording {:?} at {} Hz from {}:{}",
            request.duration, request.sample_rate, self.settings.input_format, self.settings.device
        );
        let child = Command::new(&recorder)
            .args(self.arguments(&output, &request))
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::Device(format!("failed to start recorder: {}", e)))?;

        Ok(CaptureHandle::recording(output, request, child))
    }
}
