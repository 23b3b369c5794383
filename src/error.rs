//! Custom error types for palette-infer.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the palette-infer library.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to load an image file.
    #[error("failed to load image from {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Failed to save an image file.
    #[error("failed to save image to {path}: {source}")]
    ImageSave {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Failed to read a training configuration snapshot.
    #[error("failed to read training config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Training configuration is not valid JSON for the expected schema.
    #[error("invalid training config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Failed to load an ONNX model.
    #[error("failed to load ONNX model {name}: {source}")]
    ModelLoad {
        name: String,
        #[source]
        source: ort::Error,
    },

    /// Model inference failed.
    #[error("model inference failed: {source}")]
    Inference {
        #[source]
        source: ort::Error,
    },

    /// A line of a bounding-box file could not be parsed.
    #[error("invalid bbox at {path}:{line}: {reason}")]
    BboxParse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// A bounding-box file contained no boxes.
    #[error("bbox file {path} contains no boxes")]
    EmptyBboxFile { path: PathBuf },

    /// The requested bounding box does not exist.
    #[error("bbox index {index} out of range ({count} boxes available)")]
    BboxIndex { index: usize, count: usize },

    /// The crop window (with its context margin) does not fit in the image.
    #[error("crop window of {window}px does not fit in a {width}x{height} image")]
    CropTooLarge { window: u32, width: u32, height: u32 },

    /// Unrecognised conditioning strategy in the training config.
    #[error("unknown conditioning image creation strategy {0:?}")]
    UnknownConditioning(String),

    /// A cue extractor network was needed but not supplied.
    #[error("conditioning strategy {strategy} requires an extractor model (--{flag})")]
    MissingCueModel {
        strategy: &'static str,
        flag: &'static str,
    },

    /// A training launch failed.
    #[error("training launch {index} ({name}) failed: {reason}")]
    Launch {
        index: usize,
        name: String,
        reason: String,
    },

    /// The external training command exited unsuccessfully.
    #[error("training command {program} exited with {status}")]
    LauncherFailed {
        program: String,
        status: std::process::ExitStatus,
    },

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shape mismatch in tensor operations.
    #[error("tensor shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },
}

/// Result type alias for palette-infer operations.
pub type Result<T> = std::result::Result<T, Error>;
