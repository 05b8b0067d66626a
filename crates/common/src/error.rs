//! Error types shared across Vellum crates.

use std::path::PathBuf;

/// Top-level error type for Vellum operations.
#[derive(Debug, thiserror::Error)]
pub enum VellumError {
    #[error("Invalid attribute: {message}")]
    InvalidAttribute { message: String },

    #[error("Division by zero: {axis} dimension is {dimension}")]
    DivisionByZero { axis: &'static str, dimension: f64 },

    #[error("Export failed: source image unavailable ({source_id})")]
    ImageCacheMiss { source_id: String },

    #[error("Invalid export dimensions: {width}x{height}")]
    InvalidExportDimensions { width: u32, height: u32 },

    #[error("An export is already in progress")]
    ExportInProgress,

    #[error("Export cancelled")]
    Cancelled,

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Scene error: {message}")]
    Scene { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using VellumError.
pub type VellumResult<T> = Result<T, VellumError>;

impl VellumError {
    pub fn invalid_attribute(msg: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            message: msg.into(),
        }
    }

    pub fn cache_miss(source_id: impl Into<String>) -> Self {
        Self::ImageCacheMiss {
            source_id: source_id.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn scene(msg: impl Into<String>) -> Self {
        Self::Scene {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether this error aborted an export without producing output
    /// because of the export request itself rather than the scene.
    pub fn is_export_rejection(&self) -> bool {
        matches!(
            self,
            Self::ExportInProgress | Self::Cancelled | Self::InvalidExportDimensions { .. }
        )
    }
}
