//! JSON endpoints for the identify, add and catalog workflows.

use super::state::{GuardedOrchestrator, ServerState};
use crate::audio::{AudioSource, CaptureRequest};
use crate::catalog::CatalogEntry;
use crate::engine::{IngestResult, MatchResult};
use crate::error::PipelineError;
use crate::metadata::SongMetadata;
use crate::orchestrator::{Stage, WorkflowReport};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Serialize)]
struct WorkflowResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
    status: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stages: Vec<Stage>,
}

#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

#[derive(Serialize)]
struct CatalogResponse {
    entries: Vec<CatalogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

#[derive(Deserialize, Debug, Default)]
struct RecordBody {
    pub duration_secs: Option<f64>,
    pub sample_rate: Option<u32>,
}

/// HTTP status for a workflow that ended in an error.
fn error_status(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
        PipelineError::Transcode(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::Device(_) | PipelineError::EngineMissing(_) => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::StoreUnavailable(_) | PipelineError::Cancelled(_) | PipelineError::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(request_id: Option<String>, stages: Vec<Stage>, error: &PipelineError) -> Response {
    let body = WorkflowResponse {
        request_id,
        status: error.kind(),
        message: error.user_message(),
        details: Some(error.to_string()),
        stages,
    };
    (error_status(error), Json(body)).into_response()
}

fn rejected(error: PipelineError) -> Response {
    error_response(None, Vec::new(), &error)
}

fn match_response(report: WorkflowReport<MatchResult>) -> Response {
    match &report.result {
        Ok(result) => {
            let details = match result {
                MatchResult::Found(details) | MatchResult::EngineFailure(details) => Some(details.clone()),
                MatchResult::NotFound => None,
            };
            Json(WorkflowResponse {
                request_id: Some(report.request_id.clone()),
                status: result.label(),
                message: result.message(),
                details,
                stages: report.stages.clone(),
            })
            .into_response()
        }
        Err(e) => error_response(Some(report.request_id.clone()), report.stages.clone(), e),
    }
}

fn ingest_response(report: WorkflowReport<IngestResult>) -> Response {
    match &report.result {
        Ok(result) => {
            let details = match result {
                IngestResult::Ingested(details) | IngestResult::IngestFailure(details) => {
                    Some(details.clone()).filter(|d| !d.is_empty())
                }
            };
            Json(WorkflowResponse {
                request_id: Some(report.request_id.clone()),
                status: result.label(),
                message: result.message(),
                details,
                stages: report.stages.clone(),
            })
            .into_response()
        }
        Err(e) => error_response(Some(report.request_id.clone()), report.stages.clone(), e),
    }
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, PipelineError> {
    field
        .text()
        .await
        .map_err(|e| PipelineError::Validation(format!("malformed form field: {}", e)))
}

// =============================================================================
// Identify
// =============================================================================

/// POST /v1/identify - Identify an uploaded clip (multipart/form-data, field `file`)
async fn identify_upload(
    State(orchestrator): State<GuardedOrchestrator>,
    mut multipart: Multipart,
) -> Response {
    let mut upload: Option<(Vec<u8>, Option<String>)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read multipart body: {}", e);
                return rejected(PipelineError::Validation(format!("malformed upload: {}", e)));
            }
        };
        if field.name() == Some("file") {
            let filename = field.file_name().map(|s| s.to_string());
            match field.bytes().await {
                Ok(bytes) => upload = Some((bytes.to_vec(), filename)),
                Err(e) => {
                    warn!("Failed to read file data: {}", e);
                    return rejected(PipelineError::Validation("failed to read file".to_string()));
                }
            }
        }
    }

    let Some((bytes, filename)) = upload else {
        return rejected(PipelineError::Validation("no file provided".to_string()));
    };
    debug!("Identify upload {:?} ({} bytes)", filename, bytes.len());

    let report = orchestrator
        .identify_traced(AudioSource::Upload { bytes, filename })
        .await;
    match_response(report)
}

/// POST /v1/identify/record - Record from the server's input device and identify
async fn identify_record(
    State(orchestrator): State<GuardedOrchestrator>,
    body: Option<Json<RecordBody>>,
) -> Response {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let defaults = orchestrator.capture_defaults();

    let duration = match body.duration_secs {
        None => defaults.duration,
        Some(secs) => match Duration::try_from_secs_f64(secs) {
            Ok(duration) => duration,
            Err(_) => {
                return rejected(PipelineError::Validation(format!(
                    "invalid duration: {}",
                    secs
                )))
            }
        },
    };
    let request = CaptureRequest {
        duration,
        sample_rate: body.sample_rate.unwrap_or(defaults.sample_rate),
    };

    let report = orchestrator
        .identify_traced(AudioSource::Capture(request))
        .await;
    match_response(report)
}

// =============================================================================
// Add
// =============================================================================

/// POST /v1/songs - Add a song (multipart/form-data: `file` or `path`, `title`, `artist`, `source_id`)
async fn add_song(State(state): State<ServerState>, mut multipart: Multipart) -> Response {
    let mut upload: Option<(Vec<u8>, Option<String>)> = None;
    let mut local_path: Option<String> = None;
    let mut title = String::new();
    let mut artist = String::new();
    let mut source_id: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read multipart body: {}", e);
                return rejected(PipelineError::Validation(format!("malformed upload: {}", e)));
            }
        };
        let field_name = field.name().unwrap_or("").to_string();

        let parsed = match field_name.as_str() {
            "file" => {
                let filename = field.file_name().map(|s| s.to_string());
                field
                    .bytes()
                    .await
                    .map(|bytes| upload = Some((bytes.to_vec(), filename)))
                    .map_err(|_| PipelineError::Validation("failed to read file".to_string()))
            }
            "path" => read_text(field).await.map(|v| local_path = Some(v).filter(|p| !p.trim().is_empty())),
            "title" => read_text(field).await.map(|v| title = v),
            "artist" => read_text(field).await.map(|v| artist = v),
            "source_id" => read_text(field).await.map(|v| source_id = Some(v)),
            _ => Ok(()),
        };
        if let Err(e) = parsed {
            return rejected(e);
        }
    }

    // Metadata first: a doomed request never touches the disk.
    let metadata = match SongMetadata::new(&title, &artist) {
        Ok(metadata) => metadata.with_source_id(source_id.as_deref()),
        Err(e) => return rejected(e),
    };

    let source = match (upload, local_path) {
        (Some((bytes, filename)), None) => AudioSource::Upload { bytes, filename },
        (None, Some(path)) => {
            if !state.config.allow_local_paths {
                return rejected(PipelineError::Validation(
                    "server-local paths are not accepted".to_string(),
                ));
            }
            AudioSource::LocalFile(PathBuf::from(path.trim()))
        }
        (Some(_), Some(_)) => {
            return rejected(PipelineError::Validation(
                "provide either a file or a path, not both".to_string(),
            ))
        }
        (None, None) => return rejected(PipelineError::Validation("no file provided".to_string())),
    };

    let report = state.orchestrator.add_song_traced(source, metadata).await;
    ingest_response(report)
}

// =============================================================================
// Catalog
// =============================================================================

/// GET /v1/catalog - List indexed songs
async fn list_catalog(State(orchestrator): State<GuardedOrchestrator>) -> Response {
    let listing = orchestrator.list_catalog().await;
    Json(CatalogResponse {
        entries: listing.entries,
        error: listing.error.map(|e| ErrorBody {
            kind: e.kind(),
            message: e.to_string(),
        }),
    })
    .into_response()
}

pub fn make_routes(state: ServerState) -> Router {
    let max_body_bytes = state.config.max_body_bytes;
    Router::new()
        .route("/identify", post(identify_upload))
        .route("/identify/record", post(identify_record))
        .route("/songs", post(add_song))
        .route("/catalog", get(list_catalog))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}
