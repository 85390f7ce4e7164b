//! Error types for selection and recolor operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for recolor operations
pub type Result<T> = std::result::Result<T, RecolorError>;

/// Error types surfaced by the edit pipeline and its stages
#[derive(Error, Debug)]
pub enum RecolorError {
    /// Declared content type is not in the loader allow-list
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Payload exceeds the configured byte ceiling
    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Bytes could not be decoded as the declared content type
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Neither a foreground point nor a bounding box was supplied
    #[error("Insufficient prompts: {0}")]
    InsufficientPrompts(String),

    /// Bounding box is degenerate or outside the raster
    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    /// A point prompt lies outside the raster
    #[error("Prompt ({x}, {y}) is outside the {width}x{height} raster")]
    PromptOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    /// Colour string could not be parsed
    #[error("Invalid color: {0}")]
    InvalidColor(String),

    /// Model weights are absent or failed to load; triggers the classical fallback
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Destination for exported artifacts is not writable
    #[error("Write error at '{}': {reason}", path.display())]
    WriteError { path: PathBuf, reason: String },

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encoding or processing errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Processing errors inside a stage
    #[error("Processing error: {0}")]
    Processing(String),

    /// Request was cancelled at a stage boundary
    #[error("Cancelled before stage '{0}'")]
    Cancelled(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RecolorError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(format: S) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::DecodeError(msg.into())
    }

    /// Create a new insufficient prompts error
    pub fn insufficient_prompts<S: Into<String>>(msg: S) -> Self {
        Self::InsufficientPrompts(msg.into())
    }

    /// Create a new invalid bounding box error
    pub fn invalid_bbox<S: Into<String>>(msg: S) -> Self {
        Self::InvalidBoundingBox(msg.into())
    }

    /// Create a new invalid color error
    pub fn invalid_color<S: Into<String>>(msg: S) -> Self {
        Self::InvalidColor(msg.into())
    }

    /// Create a new model unavailable error
    pub fn model_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a write error for an export destination
    pub fn write_error<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        Self::WriteError {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {operation} '{path_display}': {error}"),
        ))
    }

    /// Create model error with troubleshooting context
    pub fn model_error_with_context<P: AsRef<std::path::Path>>(
        operation: &str,
        model_path: P,
        error: &str,
        suggestions: &[&str],
    ) -> Self {
        let path_display = model_path.as_ref().display();
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::Model(format!(
            "Failed to {operation} model '{path_display}': {error}.{suggestion_text}"
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {rec}"),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {parameter}: {value} (valid range: {valid_range}).{recommendation}"
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {info})"),
            None => String::new(),
        };

        Self::Processing(format!(
            "Processing failed at stage '{stage}'{input_context}: {details}"
        ))
    }

    /// Stable snake-case identifier for transport layers
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::DecodeError(_) => "decode_error",
            Self::InsufficientPrompts(_) => "insufficient_prompts",
            Self::InvalidBoundingBox(_) => "invalid_bounding_box",
            Self::PromptOutOfBounds { .. } => "prompt_out_of_bounds",
            Self::InvalidColor(_) => "invalid_color",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::WriteError { .. } => "write_error",
            Self::Io(_) => "io",
            Self::Image(_) => "image",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Model(_) => "model",
            Self::Inference(_) => "inference",
            Self::Processing(_) => "processing",
            Self::Cancelled(_) => "cancelled",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the error was caused by the request itself rather than the service
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat(_)
                | Self::PayloadTooLarge { .. }
                | Self::DecodeError(_)
                | Self::InsufficientPrompts(_)
                | Self::InvalidBoundingBox(_)
                | Self::PromptOutOfBounds { .. }
                | Self::InvalidColor(_)
                | Self::InvalidConfig(_)
        )
    }
}
