//! Audio artifacts and the adapters that produce them.
//!
//! An [`AudioArtifact`] is the unit every later stage works on: a file on disk
//! plus what we know about it. Artifacts created by the pipeline always live
//! inside a [`TransientScope`](crate::transient::TransientScope) and are
//! deleted with it; `Local` artifacts belong to the caller and are never
//! touched.

mod capture;
mod normalizer;
mod source;

pub use capture::{CaptureDevice, CaptureHandle, CaptureSettings, CommandCaptureDevice};
#[cfg(feature = "mock")]
pub use capture::MockCaptureDevice;
pub use normalizer::{FormatNormalizer, TranscoderSettings};
pub use source::{SourceAdapter, SourceLimits};

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Container/codec tag of an audio file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Wav,
    Flac,
    Ogg,
    M4a,
    Aac,
    Opus,
    Wma,
    Unknown,
}

/// Extensions accepted for files already on disk.
const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "ogg", "m4a", "aac", "wma", "opus"];

impl AudioFormat {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "mp3" => AudioFormat::Mp3,
            "wav" | "wave" => AudioFormat::Wav,
            "flac" => AudioFormat::Flac,
            "ogg" | "oga" => AudioFormat::Ogg,
            "m4a" | "mp4" => AudioFormat::M4a,
            "aac" => AudioFormat::Aac,
            "opus" => AudioFormat::Opus,
            "wma" => AudioFormat::Wma,
            _ => AudioFormat::Unknown,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(AudioFormat::Unknown)
    }

    /// Sniffs the format from the leading bytes of a file.
    pub fn sniff(bytes: &[u8]) -> Self {
        infer::get(bytes)
            .filter(|kind| kind.matcher_type() == infer::MatcherType::Audio)
            .map(|kind| Self::from_extension(kind.extension()))
            .unwrap_or(AudioFormat::Unknown)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::M4a => "m4a",
            AudioFormat::Aac => "aac",
            AudioFormat::Opus => "opus",
            AudioFormat::Wma => "wma",
            AudioFormat::Unknown => "bin",
        }
    }

    /// Whether a filename carries one of the extensions we accept from disk.
    pub fn is_supported_filename(filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioFormat::Unknown => f.write_str("unknown"),
            other => f.write_str(other.extension()),
        }
    }
}

/// Where an artifact's bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactOrigin {
    Captured,
    Uploaded,
    /// A caller-owned file referenced in place.
    Local,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioArtifact {
    source_path: PathBuf,
    format: AudioFormat,
    duration_hint: Option<Duration>,
    origin: ArtifactOrigin,
}

impl AudioArtifact {
    pub fn new(source_path: impl Into<PathBuf>, format: AudioFormat, origin: ArtifactOrigin) -> Self {
        Self {
            source_path: source_path.into(),
            format,
            duration_hint: None,
            origin,
        }
    }

    pub fn with_duration_hint(mut self, duration: Duration) -> Self {
        self.duration_hint = Some(duration);
        self
    }

    /// A derivative of this artifact (e.g. its transcoded copy) at `path`.
    pub fn derive(&self, path: impl Into<PathBuf>, format: AudioFormat) -> Self {
        Self {
            source_path: path.into(),
            format,
            duration_hint: self.duration_hint,
            origin: self.origin,
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    pub fn duration_hint(&self) -> Option<Duration> {
        self.duration_hint
    }

    pub fn origin(&self) -> ArtifactOrigin {
        self.origin
    }
}

/// Parameters for a live recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub duration: Duration,
    pub sample_rate: u32,
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(8),
            sample_rate: 44100,
        }
    }
}

/// Audio as submitted by the presentation layer.
#[derive(Debug, Clone)]
pub enum AudioSource {
    Capture(CaptureRequest),
    Upload {
        bytes: Vec<u8>,
        filename: Option<String>,
    },
    LocalFile(PathBuf),
}

impl AudioSource {
    pub fn label(&self) -> &'static str {
        match self {
            AudioSource::Capture(_) => "capture",
            AudioSource::Upload { .. } => "upload",
            AudioSource::LocalFile(_) => "local_file",
        }
    }
}
