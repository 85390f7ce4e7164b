//! Async front door over the blocking pipeline
//!
//! Edits are CPU-bound, so each one runs on the blocking thread pool. A
//! semaphore bounds how many run at once; callers beyond the limit wait for
//! a permit or give up when their cancellation token fires.

use crate::{
    config::PipelineConfig,
    error::{RecolorError, Result},
    processor::{EditOutcome, EditPipeline, EditRequest},
    types::EditResult,
};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Liveness summary answered without running a segmentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    /// The model handle finished loading successfully
    pub model_loaded: bool,
    /// A pipeline can be built from the current configuration
    pub constructible: bool,
    /// Why the model could not be loaded, once a load was attempted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_error: Option<String>,
    pub max_concurrent_edits: usize,
}

/// Bounded, cancellable edit service
#[derive(Debug, Clone)]
pub struct EditService {
    pipeline: Arc<EditPipeline>,
    permits: Arc<Semaphore>,
    limit: usize,
}

impl EditService {
    /// Wrap a pipeline; the concurrency limit comes from its configuration
    #[must_use]
    pub fn new(pipeline: EditPipeline) -> Self {
        let limit = pipeline.config().concurrency.effective_limit();
        Self {
            pipeline: Arc::new(pipeline),
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Service over the process-wide model handle
    ///
    /// # Errors
    /// Invalid configuration
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        Ok(Self::new(EditPipeline::global(config)?))
    }

    #[must_use]
    pub fn pipeline(&self) -> &EditPipeline {
        &self.pipeline
    }

    /// Permits not currently held by running edits
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    async fn acquire(&self, cancel: &CancellationToken) -> Result<OwnedSemaphorePermit> {
        tokio::select! {
            () = cancel.cancelled() => Err(RecolorError::Cancelled("queue".to_string())),
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|_| RecolorError::internal("edit worker pool closed"))
            }
        }
    }

    async fn run_blocking<T, F>(&self, cancel: CancellationToken, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&EditPipeline, &CancellationToken) -> Result<T> + Send + 'static,
    {
        let permit = self.acquire(&cancel).await?;
        let pipeline = Arc::clone(&self.pipeline);
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job(&pipeline, &cancel)
        })
        .await
        .map_err(|e| RecolorError::internal(format!("edit task failed: {e}")))?
    }

    /// Run one edit without exporting
    ///
    /// # Errors
    /// Any pipeline error, or `Cancelled` while queued or between stages
    pub async fn edit(&self, request: EditRequest, cancel: CancellationToken) -> Result<EditResult> {
        self.run_blocking(cancel, move |pipeline, cancel| pipeline.run(&request, cancel))
            .await
    }

    /// Run one edit and write its artifacts
    ///
    /// # Errors
    /// Any pipeline error, `WriteError`, or `Cancelled`
    pub async fn edit_and_export(
        &self,
        request: EditRequest,
        cancel: CancellationToken,
    ) -> Result<EditOutcome> {
        self.run_blocking(cancel, move |pipeline, cancel| {
            pipeline.run_and_export(&request, cancel)
        })
        .await
    }

    /// Run several independent edits, results in request order
    pub async fn edit_many(
        &self,
        requests: Vec<EditRequest>,
        cancel: &CancellationToken,
    ) -> Vec<Result<EditResult>> {
        join_all(
            requests
                .into_iter()
                .map(|request| self.edit(request, cancel.child_token())),
        )
        .await
    }

    /// Health summary; never loads the model or segments anything
    #[must_use]
    pub fn health(&self) -> HealthStatus {
        let model = self.pipeline.model();
        HealthStatus {
            model_loaded: model.is_loaded(),
            constructible: self.pipeline.is_constructible(),
            model_error: model.load_error().map(str::to_string),
            max_concurrent_edits: self.limit,
        }
    }
}
