//! Process-wide model handle, loaded at most once
//!
//! The first request that needs the model pays the load; every later request
//! reuses the same handle. A failed load is remembered too, so a missing model
//! directory is probed once and the classical strategy serves from then on.

use crate::{
    backends::DefaultBackendFactory,
    config::SegmenterConfig,
    error::{RecolorError, Result},
    inference::{BackendFactory, PromptSegmentationBackend},
    models::{ModelManager, ModelManifest},
};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

/// Initialised backend plus the manifest describing its inputs
#[derive(Debug)]
pub struct ModelHandle {
    backend: Box<dyn PromptSegmentationBackend>,
    manifest: ModelManifest,
    load_time_ms: u64,
}

impl ModelHandle {
    /// Resolve the model directory and initialise a backend for it
    ///
    /// # Errors
    /// - [`RecolorError::ModelUnavailable`] if no directory is configured or it is incomplete
    /// - Backend initialisation failures
    pub fn load(config: &SegmenterConfig, factory: &dyn BackendFactory) -> Result<Self> {
        let dir: PathBuf = config
            .model_dir
            .clone()
            .ok_or_else(|| RecolorError::model_unavailable("no model directory configured"))?;

        let models = ModelManager::from_dir(&dir)?;
        let mut backend = factory.create(config)?;
        let load_time = backend.initialize(&models, config)?;

        let load_time_ms = load_time.map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        log::info!(
            "Model '{}' ready on {} backend ({load_time_ms}ms)",
            models.manifest().name,
            backend.name()
        );

        Ok(Self {
            backend,
            manifest: models.manifest().clone(),
            load_time_ms,
        })
    }

    #[must_use]
    pub fn backend(&self) -> &dyn PromptSegmentationBackend {
        self.backend.as_ref()
    }

    #[must_use]
    pub fn manifest(&self) -> &ModelManifest {
        &self.manifest
    }

    #[must_use]
    pub fn load_time_ms(&self) -> u64 {
        self.load_time_ms
    }
}

type LoadOutcome = std::result::Result<Arc<ModelHandle>, String>;

/// Lazily loaded, shared model handle
#[derive(Debug)]
pub struct SharedModel {
    config: SegmenterConfig,
    factory: Arc<dyn BackendFactory>,
    cell: OnceLock<LoadOutcome>,
}

static GLOBAL: OnceLock<Arc<SharedModel>> = OnceLock::new();

impl SharedModel {
    #[must_use]
    pub fn new(config: SegmenterConfig) -> Self {
        Self::with_factory(config, Arc::new(DefaultBackendFactory))
    }

    #[must_use]
    pub fn with_factory(config: SegmenterConfig, factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            config,
            factory,
            cell: OnceLock::new(),
        }
    }

    /// Process-wide instance; the configuration of the first caller wins
    pub fn global(config: &SegmenterConfig) -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new(config.clone()))))
    }

    /// Get the model, loading it on first use
    ///
    /// Returns `None` when the classical strategy is preferred or loading failed.
    pub fn get(&self) -> Option<Arc<ModelHandle>> {
        if self.config.prefer_classical {
            return None;
        }
        let outcome = self.cell.get_or_init(|| {
            ModelHandle::load(&self.config, self.factory.as_ref())
                .map(Arc::new)
                .map_err(|e| {
                    log::warn!("Model-guided segmentation unavailable: {e}");
                    e.to_string()
                })
        });
        outcome.as_ref().ok().cloned()
    }

    /// Whether a load has completed successfully, without triggering one
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self.cell.get(), Some(Ok(_)))
    }

    /// Reason the last load failed, if it did
    #[must_use]
    pub fn load_error(&self) -> Option<&str> {
        match self.cell.get() {
            Some(Err(reason)) => Some(reason.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{mock_model_dir, MockBackendFactory};
    use std::sync::atomic::Ordering;

    fn config_for(dir: Option<PathBuf>) -> SegmenterConfig {
        SegmenterConfig {
            model_dir: dir,
            ..SegmenterConfig::default()
        }
    }

    #[test]
    fn test_loads_once_across_threads() {
        let dir = mock_model_dir(64);
        let factory = Arc::new(MockBackendFactory::new());
        let shared = Arc::new(SharedModel::with_factory(
            config_for(Some(dir.path().to_path_buf())),
            factory.clone(),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || shared.get().is_some())
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }

        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert_eq!(factory.calls.initialize(), 1);
        assert!(shared.is_loaded());
        assert_eq!(shared.get().unwrap().manifest().input_size, 64);
    }

    #[test]
    fn test_missing_directory_is_remembered() {
        let factory = Arc::new(MockBackendFactory::new());
        let shared = SharedModel::with_factory(
            config_for(Some(PathBuf::from("/no/such/models"))),
            factory.clone(),
        );
        assert!(!shared.is_loaded());
        assert!(shared.get().is_none());
        assert!(shared.get().is_none());
        assert_eq!(factory.created.load(Ordering::SeqCst), 0);
        assert!(shared.load_error().unwrap().contains("not found"));
    }

    #[test]
    fn test_prefer_classical_skips_loading() {
        let dir = mock_model_dir(64);
        let factory = Arc::new(MockBackendFactory::new());
        let mut config = config_for(Some(dir.path().to_path_buf()));
        config.prefer_classical = true;
        let shared = SharedModel::with_factory(config, factory.clone());
        assert!(shared.get().is_none());
        assert_eq!(factory.created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_init_failure_yields_none() {
        let dir = mock_model_dir(64);
        let factory = Arc::new(MockBackendFactory {
            fail_init: true,
            ..MockBackendFactory::default()
        });
        let shared = SharedModel::with_factory(
            config_for(Some(dir.path().to_path_buf())),
            factory.clone(),
        );
        assert!(shared.get().is_none());
        assert!(shared.load_error().is_some());
    }
}
