//! Composes the pipeline components into the identify and add workflows.
//!
//! Every run gets its own transient scope, named after the run's request id.
//! Whatever happens, the scope is closed before the run returns, and dropping
//! an in-flight run (client went away) tears it down through `Drop` instead.
//! The one exception is a running ingester: it owns the scope from then on
//! and closes it when it exits.

mod workflow;

pub use workflow::{Stage, WorkflowKind, WorkflowReport};

use crate::audio::{
    AudioArtifact, AudioSource, CaptureDevice, CaptureRequest, CommandCaptureDevice,
    FormatNormalizer, SourceAdapter,
};
use crate::catalog::{CatalogListing, CatalogReader};
use crate::config::AppConfig;
use crate::engine::{interpret_ingest, interpret_match, EngineInvoker, EngineOutcome, IngestResult, MatchResult};
use crate::error::{PipelineError, PipelineResult};
use crate::metadata::SongMetadata;
use crate::metrics;
use crate::transient::{TransientRoot, TransientScope};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use workflow::StageTrace;

/// Which external executables can currently be resolved.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub matcher: bool,
    pub ingester: bool,
    pub transcoder: bool,
}

pub struct RequestOrchestrator {
    transient: TransientRoot,
    source: SourceAdapter,
    normalizer: FormatNormalizer,
    invoker: Arc<EngineInvoker>,
    catalog: Arc<dyn CatalogReader>,
    capture_defaults: CaptureRequest,
}

impl RequestOrchestrator {
    pub fn new(
        transient: TransientRoot,
        source: SourceAdapter,
        normalizer: FormatNormalizer,
        invoker: Arc<EngineInvoker>,
        catalog: Arc<dyn CatalogReader>,
    ) -> Self {
        Self {
            transient,
            source,
            normalizer,
            invoker,
            catalog,
            capture_defaults: CaptureRequest::default(),
        }
    }

    pub fn with_capture_defaults(mut self, defaults: CaptureRequest) -> Self {
        self.capture_defaults = defaults;
        self
    }

    /// Builds the full component graph from resolved configuration.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let device = Arc::new(CommandCaptureDevice::new(
            config.capture.clone(),
            config.engine.working_dir.clone(),
        ));
        Self::from_config_with_capture(config, device)
    }

    /// Like [`from_config`](Self::from_config) with a caller-supplied capture device.
    pub fn from_config_with_capture(
        config: &AppConfig,
        device: Arc<dyn CaptureDevice>,
    ) -> anyhow::Result<Self> {
        let invoker = Arc::new(EngineInvoker::new(config.engine.clone()));
        let normalizer = FormatNormalizer::new(invoker.clone(), config.transcoder.clone());
        let source = SourceAdapter::new(device, config.limits.clone());
        let catalog = config.catalog.build_reader()?;
        info!(
            "Orchestrator ready: matcher {:?}, ingester {:?}, catalog {}",
            config.engine.matcher_path,
            config.engine.ingester_path,
            catalog.describe()
        );
        Ok(Self::new(
            TransientRoot::new(config.temp_dir.clone()),
            source,
            normalizer,
            invoker,
            catalog,
        )
        .with_capture_defaults(config.capture_defaults))
    }

    pub fn capture_defaults(&self) -> CaptureRequest {
        self.capture_defaults
    }

    pub fn transient_root(&self) -> &TransientRoot {
        &self.transient
    }

    pub fn source_adapter(&self) -> &SourceAdapter {
        &self.source
    }

    pub fn engine_status(&self) -> EngineStatus {
        let settings = self.invoker.settings();
        EngineStatus {
            matcher: self.invoker.resolve(&settings.matcher_path).is_some(),
            ingester: self.invoker.resolve(&settings.ingester_path).is_some(),
            transcoder: self.invoker.resolve(self.normalizer.executable()).is_some(),
        }
    }

    // =========================================================================
    // Identify
    // =========================================================================

    pub async fn identify(&self, source: AudioSource) -> PipelineResult<MatchResult> {
        self.identify_traced(source).await.into_result()
    }

    pub async fn identify_traced(&self, source: AudioSource) -> WorkflowReport<MatchResult> {
        self.identify_cancellable(source, std::future::pending()).await
    }

    /// Identify, abandoning a live capture as soon as `cancel` resolves.
    ///
    /// Cancellation is only honored while acquiring audio; once the matcher
    /// runs, the run completes.
    pub async fn identify_cancellable<C>(&self, source: AudioSource, cancel: C) -> WorkflowReport<MatchResult>
    where
        C: Future<Output = ()> + Send,
    {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("identify", request_id = %request_id, source = source.label());
        async move {
            let mut trace = StageTrace::new(WorkflowKind::Identify);
            let result = self.run_identify(&mut trace, &request_id, source, cancel).await;
            let report = trace.finish(request_id, result);
            record_outcome(&report, MatchResult::label);
            report
        }
        .instrument(span)
        .await
    }

    async fn run_identify<C>(
        &self,
        trace: &mut StageTrace,
        request_id: &str,
        source: AudioSource,
        cancel: C,
    ) -> PipelineResult<MatchResult>
    where
        C: Future<Output = ()> + Send,
    {
        trace.enter(Stage::Acquiring);
        self.source.validate(&source)?;
        let mut scope = self.transient.open_scope_for(request_id)?;
        let result = self.identify_in_scope(&mut scope, trace, source, cancel).await;
        close_scope(scope).await;
        result
    }

    async fn identify_in_scope<C>(
        &self,
        scope: &mut TransientScope,
        trace: &mut StageTrace,
        source: AudioSource,
        cancel: C,
    ) -> PipelineResult<MatchResult>
    where
        C: Future<Output = ()> + Send,
    {
        let artifact = self.acquire(scope, source, cancel).await?;

        trace.enter(Stage::Normalizing);
        let artifact = self.normalizer.normalize(scope, artifact).await?;

        trace.enter(Stage::Invoking);
        let outcome = self.invoker.run_matcher(&artifact).await;
        ensure_launched(&outcome)?;

        trace.enter(Stage::Interpreting);
        let result = interpret_match(&outcome, &self.invoker.settings().protocol);
        info!("Identify result: {}", result.label());
        release_artifact(scope, &artifact).await;
        Ok(result)
    }

    // =========================================================================
    // Add
    // =========================================================================

    pub async fn add_song(&self, source: AudioSource, metadata: SongMetadata) -> PipelineResult<IngestResult> {
        self.add_song_traced(source, metadata).await.into_result()
    }

    pub async fn add_song_traced(&self, source: AudioSource, metadata: SongMetadata) -> WorkflowReport<IngestResult> {
        self.add_song_cancellable(source, metadata, std::future::pending())
            .await
    }

    /// Add, abandoning a live capture as soon as `cancel` resolves.
    ///
    /// The ingester itself is never interrupted, not even by dropping this
    /// future: a killed ingester could leave a half-written catalog entry.
    pub async fn add_song_cancellable<C>(
        &self,
        source: AudioSource,
        metadata: SongMetadata,
        cancel: C,
    ) -> WorkflowReport<IngestResult>
    where
        C: Future<Output = ()> + Send,
    {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("add", request_id = %request_id, source = source.label());
        async move {
            let mut trace = StageTrace::new(WorkflowKind::Add);
            let result = self
                .run_add(&mut trace, &request_id, source, metadata, cancel)
                .await;
            let report = trace.finish(request_id, result);
            record_outcome(&report, IngestResult::label);
            report
        }
        .instrument(span)
        .await
    }

    async fn run_add<C>(
        &self,
        trace: &mut StageTrace,
        request_id: &str,
        source: AudioSource,
        metadata: SongMetadata,
        cancel: C,
    ) -> PipelineResult<IngestResult>
    where
        C: Future<Output = ()> + Send,
    {
        // Nothing is allocated until both the metadata and the source check out.
        trace.enter(Stage::ValidatingMetadata);
        metadata.validate()?;
        self.source.validate(&source)?;

        trace.enter(Stage::Acquiring);
        let mut scope = self.transient.open_scope_for(request_id)?;
        let artifact = match self.acquire_for_ingest(&mut scope, source, cancel).await {
            Ok(artifact) => artifact,
            Err(e) => {
                close_scope(scope).await;
                return Err(e);
            }
        };

        trace.enter(Stage::Invoking);
        info!(
            "Ingesting '{}' by '{}'",
            metadata.title(),
            metadata.artist()
        );
        let outcome = self.ingest_detached(scope, artifact, metadata).await?;
        ensure_launched(&outcome)?;

        trace.enter(Stage::Interpreting);
        let result = interpret_ingest(&outcome);
        info!("Add result: {}", result.label());
        Ok(result)
    }

    async fn acquire_for_ingest<C>(
        &self,
        scope: &mut TransientScope,
        source: AudioSource,
        cancel: C,
    ) -> PipelineResult<AudioArtifact>
    where
        C: Future<Output = ()> + Send,
    {
        // The ingester decodes the same format as the matcher, so conversion
        // is part of acquiring here.
        let artifact = self.acquire(scope, source, cancel).await?;
        self.normalizer.normalize(scope, artifact).await
    }

    /// Runs the ingester on its own task, which takes over the scope.
    ///
    /// If the caller goes away the task is detached, not aborted: the
    /// ingester runs to completion and the scope is closed after it exits.
    async fn ingest_detached(
        &self,
        mut scope: TransientScope,
        artifact: AudioArtifact,
        metadata: SongMetadata,
    ) -> PipelineResult<EngineOutcome> {
        let invoker = self.invoker.clone();
        let task = tokio::spawn(
            async move {
                let outcome = invoker.run_ingester(&artifact, &metadata).await;
                release_artifact(&mut scope, &artifact).await;
                close_scope(scope).await;
                outcome
            }
            .in_current_span(),
        );
        task.await.map_err(|e| PipelineError::Io(std::io::Error::other(e)))
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    pub async fn list_catalog(&self) -> CatalogListing {
        let listing = self.catalog.list_entries().await;
        match &listing.error {
            None => info!(
                "Listed {} catalog entries from {}",
                listing.entries.len(),
                self.catalog.describe()
            ),
            Some(e) => warn!("Catalog listing from {} failed: {}", self.catalog.describe(), e),
        }
        listing
    }

    // =========================================================================
    // Shared steps
    // =========================================================================

    async fn acquire<C>(
        &self,
        scope: &mut TransientScope,
        source: AudioSource,
        cancel: C,
    ) -> PipelineResult<AudioArtifact>
    where
        C: Future<Output = ()> + Send,
    {
        match source {
            AudioSource::Capture(request) => {
                let handle = self.source.start_capture(scope, request).await?;
                info!("Recording {:?} at {} Hz", request.duration, request.sample_rate);
                // Losing the race drops the handle, which stops the recorder;
                // the partial file goes with the scope.
                tokio::select! {
                    captured = handle.wait() => captured,
                    _ = cancel => Err(PipelineError::Cancelled("capture cancelled".to_string())),
                }
            }
            other => self.source.acquire(scope, other).await,
        }
    }
}

/// A missing or unstartable engine is an operational fault, not a negative result.
fn ensure_launched(outcome: &EngineOutcome) -> PipelineResult<()> {
    if outcome.launched {
        Ok(())
    } else {
        Err(PipelineError::EngineMissing(
            outcome.standard_error.trim().to_string(),
        ))
    }
}

async fn release_artifact(scope: &mut TransientScope, artifact: &AudioArtifact) {
    if let Err(e) = scope.release(artifact).await {
        warn!("Failed to release {:?}: {}", artifact.source_path(), e);
    }
}

async fn close_scope(scope: TransientScope) {
    let path = scope.path().to_path_buf();
    if let Err(e) = scope.close().await {
        warn!("Failed to clean up transient scope {:?}: {}", path, e);
    }
}

fn record_outcome<T>(report: &WorkflowReport<T>, label: fn(&T) -> &'static str) {
    let outcome = match &report.result {
        Ok(result) => label(result),
        Err(e) => e.kind(),
    };
    metrics::record_workflow(report.kind.as_str(), outcome);
}
