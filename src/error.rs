//! Error taxonomy shared by every stage of the request pipeline.

use thiserror::Error;

/// Errors that can end an identify/add workflow or a catalog read.
///
/// Negative outcomes reported by the engines themselves (no match, ingest
/// rejected) are not errors: they are carried by
/// [`MatchResult`](crate::engine::MatchResult) and
/// [`IngestResult`](crate::engine::IngestResult).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Capture device error: {0}")]
    Device(String),

    #[error("Transcoding failed: {0}")]
    Transcode(String),

    #[error("Engine executable unavailable: {0}")]
    EngineMissing(String),

    #[error("Catalog store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Stable machine-readable tag, used in API payloads and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation_error",
            PipelineError::Device(_) => "device_error",
            PipelineError::Transcode(_) => "transcode_error",
            PipelineError::EngineMissing(_) => "engine_missing",
            PipelineError::StoreUnavailable(_) => "store_unavailable",
            PipelineError::Cancelled(_) => "cancelled",
            PipelineError::Io(_) => "io_error",
        }
    }

    /// Message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Validation(msg) => format!("Please check your input: {}", msg),
            PipelineError::Device(_) => {
                "The recording device is not available. Check the microphone and try again."
                    .to_string()
            }
            PipelineError::Transcode(_) => "The audio could not be converted.".to_string(),
            PipelineError::EngineMissing(_) => {
                "Engine error: the recognition engine is not installed or not runnable.".to_string()
            }
            PipelineError::StoreUnavailable(_) => "The song catalog is unavailable.".to_string(),
            PipelineError::Cancelled(_) => "The request was cancelled.".to_string(),
            PipelineError::Io(_) => "An internal error occurred.".to_string(),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
