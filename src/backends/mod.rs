//! Backend implementations for different inference engines
//!
//! - ONNX Runtime backend (native runtime, GPU acceleration)
//! - Tract backend (pure Rust, no external dependencies)

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

// Test utilities for backend testing
#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;

use crate::config::SegmenterConfig;
use crate::error::Result;
use crate::inference::{BackendFactory, PromptSegmentationBackend};

/// Picks the inference engine compiled into this build
///
/// ONNX Runtime wins when both features are enabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create(&self, _config: &SegmenterConfig) -> Result<Box<dyn PromptSegmentationBackend>> {
        compiled_backend()
    }

    fn available_backends(&self) -> Vec<&'static str> {
        let mut backends = Vec::new();
        if cfg!(feature = "onnx") {
            backends.push("onnx");
        }
        if cfg!(feature = "tract") {
            backends.push("tract");
        }
        backends
    }
}

#[cfg(feature = "onnx")]
fn compiled_backend() -> Result<Box<dyn PromptSegmentationBackend>> {
    Ok(Box::new(OnnxBackend::new()))
}

#[cfg(all(feature = "tract", not(feature = "onnx")))]
fn compiled_backend() -> Result<Box<dyn PromptSegmentationBackend>> {
    Ok(Box::new(TractBackend::new()))
}

#[cfg(not(any(feature = "onnx", feature = "tract")))]
fn compiled_backend() -> Result<Box<dyn PromptSegmentationBackend>> {
    Err(crate::error::RecolorError::model_unavailable(
        "no inference backend compiled in (enable the `tract` or `onnx` feature)",
    ))
}
