use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while bringing the service up: configuration, directories and model loading.
///
/// Request handling never produces these; per-request failures are [`PipelineError`]s.
#[derive(Error, Debug)]
pub enum EnhanceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {operation} failed")]
    Server {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type Result<T> = std::result::Result<T, EnhanceError>;

/// The pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Validation,
    Preprocessing,
    Inference,
    Postprocessing,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Preprocessing => "preprocessing",
            Self::Inference => "inference",
            Self::Postprocessing => "postprocessing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No file part")]
    NoFilePart,

    #[error("No selected file")]
    NoSelectedFile,

    #[error("Invalid filename: {name:?}")]
    InvalidFilename { name: String },

    #[error("Unsupported image format: {name:?}")]
    UnsupportedFormat { name: String },

    #[error("Uploaded file is empty")]
    EmptyFile,

    #[error("File exceeds the upload size limit")]
    TooLarge,

    #[error("Malformed upload: {reason}")]
    Malformed { reason: String },
}

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("cannot decode image: {source}")]
    Decode {
        #[source]
        source: image::ImageError,
    },

    #[error("failed to read {:?}: {source}", file_label(.path))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to store upload {:?}: {source}", file_label(.path))]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to convert image to tensor: {reason}")]
    Convert { reason: String },
}

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("input shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("{source}")]
    Runtime {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("model returned an unusable output: {reason}")]
    InvalidOutput { reason: String },

    #[error("model panicked during the forward pass: {message}")]
    Panicked { message: String },
}

impl InferenceError {
    pub fn runtime<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Runtime {
            source: Box::new(err),
        }
    }
}

#[derive(Error, Debug)]
pub enum PostprocessError {
    #[error("output tensor has an empty batch axis")]
    EmptyBatch,

    #[error("output tensor has {channels} channels, expected 1, 3 or 4")]
    UnsupportedChannels { channels: usize },

    #[error("output tensor of {height}x{width} cannot be addressed as an image")]
    Dimensions { width: usize, height: usize },

    #[error("no encoder available for {:?}", file_label(.path))]
    UnsupportedFormat { path: PathBuf },

    #[error("failed to encode {:?}: {source}", file_label(.path))]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to write {:?}: {source}", file_label(.path))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A request failure, tagged by stage, carrying the stage's own error as its cause.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Error processing image: {0}")]
    Preprocessing(#[from] PreprocessError),

    #[error("Error during model prediction: {0}")]
    Inference(#[from] InferenceError),

    #[error("Error saving enhanced image: {0}")]
    Postprocessing(#[from] PostprocessError),
}

/// The final path component; request errors reach the client and must not expose server paths.
fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub type PipelineResult = std::result::Result<String, PipelineError>;

impl PipelineError {
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Validation(_) => Stage::Validation,
            Self::Preprocessing(_) => Stage::Preprocessing,
            Self::Inference(_) => Stage::Inference,
            Self::Postprocessing(_) => Stage::Postprocessing,
        }
    }

    /// Whether the failure lies with the request rather than with the server.
    pub const fn is_client_error(&self) -> bool {
        match self {
            Self::Validation(_) => true,
            Self::Preprocessing(PreprocessError::Store { .. } | PreprocessError::Read { .. }) => {
                false
            }
            Self::Preprocessing(_) => true,
            Self::Inference(_) | Self::Postprocessing(_) => false,
        }
    }
}
