//! Stage bookkeeping for the identify and add workflows.

use crate::error::{PipelineError, PipelineResult};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Identify,
    Add,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::Identify => "identify",
            WorkflowKind::Add => "add",
        }
    }

    /// The stages a successful run passes through, in order.
    pub fn happy_path(&self) -> &'static [Stage] {
        match self {
            WorkflowKind::Identify => &[
                Stage::Idle,
                Stage::Acquiring,
                Stage::Normalizing,
                Stage::Invoking,
                Stage::Interpreting,
                Stage::Done,
            ],
            WorkflowKind::Add => &[
                Stage::Idle,
                Stage::ValidatingMetadata,
                Stage::Acquiring,
                Stage::Invoking,
                Stage::Interpreting,
                Stage::Done,
            ],
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    ValidatingMetadata,
    Acquiring,
    Normalizing,
    Invoking,
    Interpreting,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

/// Ordered record of the stages one request went through.
#[derive(Debug, Clone)]
pub(crate) struct StageTrace {
    kind: WorkflowKind,
    stages: Vec<Stage>,
    started: Instant,
}

impl StageTrace {
    pub(crate) fn new(kind: WorkflowKind) -> Self {
        Self {
            kind,
            stages: vec![Stage::Idle],
            started: Instant::now(),
        }
    }

    pub(crate) fn current(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Idle)
    }

    /// Moves to the next happy-path stage. Out-of-order moves are ignored.
    pub(crate) fn enter(&mut self, stage: Stage) {
        let current = self.current();
        if current.is_terminal() {
            warn!("{} workflow already finished, ignoring {:?}", self.kind, stage);
            return;
        }
        let path = self.kind.happy_path();
        let expected = path
            .iter()
            .position(|s| *s == current)
            .and_then(|i| path.get(i + 1));
        if expected != Some(&stage) {
            warn!(
                "{} workflow cannot move from {:?} to {:?}",
                self.kind, current, stage
            );
            return;
        }
        debug!("{} workflow: {:?} -> {:?}", self.kind, current, stage);
        self.stages.push(stage);
    }

    /// Ends the trace in `Done` or `Failed` depending on `result`.
    pub(crate) fn finish<T>(mut self, request_id: String, result: PipelineResult<T>) -> WorkflowReport<T> {
        let elapsed = self.started.elapsed();
        let last = self.current();
        match &result {
            Ok(_) => {
                if !last.is_terminal() {
                    self.stages.push(Stage::Done);
                }
                info!("{} workflow done in {:?}", self.kind, elapsed);
            }
            Err(e) => {
                if !last.is_terminal() {
                    self.stages.push(Stage::Failed);
                }
                warn!(
                    "{} workflow failed at {:?} after {:?}: {}",
                    self.kind, last, elapsed, e
                );
            }
        }
        WorkflowReport {
            request_id,
            kind: self.kind,
            stages: self.stages,
            elapsed,
            result,
        }
    }
}

/// Outcome of one workflow run, with the stages it went through.
#[derive(Debug)]
pub struct WorkflowReport<T> {
    pub request_id: String,
    pub kind: WorkflowKind,
    /// Starts at `Idle` and ends in exactly one of `Done` or `Failed`.
    pub stages: Vec<Stage>,
    pub elapsed: Duration,
    pub result: PipelineResult<T>,
}

impl<T> WorkflowReport<T> {
    pub fn terminal_stage(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Idle)
    }

    /// The last stage before the terminal one.
    pub fn last_active_stage(&self) -> Stage {
        self.stages
            .iter()
            .rev()
            .find(|s| !s.is_terminal())
            .copied()
            .unwrap_or(Stage::Idle)
    }

    pub fn error(&self) -> Option<&PipelineError> {
        self.result.as_ref().err()
    }

    pub fn into_result(self) -> PipelineResult<T> {
        self.result
    }
}
