//! Maps raw engine outcomes onto typed results.
//!
//! The engine is the only authority on match semantics: apart from telling
//! blank output apart from real text, nothing here looks inside stdout.

use super::invoker::EngineOutcome;
use serde::{Deserialize, Serialize};

/// Documented conventions of the engine's exit codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EngineProtocol {
    /// Exit code the matcher uses to say "no match". When unset, any nonzero
    /// exit without diagnostics on stderr counts as no match.
    pub no_match_exit_code: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "details", rename_all = "snake_case")]
pub enum MatchResult {
    /// The engine's description of the match, verbatim.
    Found(String),
    NotFound,
    EngineFailure(String),
}

impl MatchResult {
    pub fn label(&self) -> &'static str {
        match self {
            MatchResult::Found(_) => "found",
            MatchResult::NotFound => "not_found",
            MatchResult::EngineFailure(_) => "engine_failure",
        }
    }

    pub fn message(&self) -> String {
        match self {
            MatchResult::Found(details) => format!("Match found: {}", details),
            MatchResult::NotFound => "No match found.".to_string(),
            MatchResult::EngineFailure(reason) => format!("Engine error: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "details", rename_all = "snake_case")]
pub enum IngestResult {
    Ingested(String),
    IngestFailure(String),
}

impl IngestResult {
    pub fn label(&self) -> &'static str {
        match self {
            IngestResult::Ingested(_) => "ingested",
            IngestResult::IngestFailure(_) => "ingest_failure",
        }
    }

    pub fn message(&self) -> String {
        match self {
            IngestResult::Ingested(details) if details.is_empty() => {
                "Song added successfully.".to_string()
            }
            IngestResult::Ingested(details) => format!("Song added successfully: {}", details),
            IngestResult::IngestFailure(reason) => format!("Could not add song: {}", reason),
        }
    }
}

pub fn interpret_match(outcome: &EngineOutcome, protocol: &EngineProtocol) -> MatchResult {
    let stdout = outcome.standard_output.trim();
    let stderr = outcome.standard_error.trim();

    if !outcome.launched {
        return MatchResult::EngineFailure(non_empty_or(stderr, "matcher could not be started"));
    }

    if outcome.exit_status == 0 {
        return if stdout.is_empty() {
            MatchResult::NotFound
        } else {
            MatchResult::Found(stdout.to_string())
        };
    }

    if protocol.no_match_exit_code == Some(outcome.exit_status) {
        return MatchResult::NotFound;
    }

    if stderr.is_empty() {
        MatchResult::NotFound
    } else {
        MatchResult::EngineFailure(stderr.to_string())
    }
}

pub fn interpret_ingest(outcome: &EngineOutcome) -> IngestResult {
    if outcome.success() {
        return IngestResult::Ingested(outcome.standard_output.trim().to_string());
    }

    let stderr = outcome.standard_error.trim();
    let stdout = outcome.standard_output.trim();
    let reason = if !stderr.is_empty() {
        stderr.to_string()
    } else if !stdout.is_empty() {
        stdout.to_string()
    } else {
        format!("ingester exited with status {}", outcome.exit_status)
    };
    IngestResult::IngestFailure(reason)
}

fn non_empty_or(text: &str, fallback: &str) -> String {
    if text.is_empty() {
        fallback.to_string()
    } else {
        text.to_string()
    }
}
