//! Per-request coordination: validate, store, preprocess, infer, postprocess.
//!
//! Each step either advances the request or ends it with a stage-tagged [`PipelineError`].
//! Nothing is retried. Files already written stay in place when a later step fails.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::errors::{PipelineError, PipelineResult, PreprocessError, Stage, ValidationError};
use crate::inference::infer;
use crate::postprocess::{output_format, postprocess};
use crate::preprocess::preprocess;
use crate::storage::{secure_filename, write_atomic, ImageStore};
use crate::traits::ImageToImageModel;

/// A file part as received from the client, before validation.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedImage {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// Where a request is in the pipeline. Tracked per request for logging; the caller only
/// sees the final [`PipelineResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    Validated,
    Preprocessed,
    Inferred,
    Postprocessed,
    Completed,
    Failed { stage: Stage, message: String },
}

impl PipelineState {
    /// The successor on the success path. Terminal states stay put.
    pub fn next(&self) -> Self {
        match self {
            Self::Received => Self::Validated,
            Self::Validated => Self::Preprocessed,
            Self::Preprocessed => Self::Inferred,
            Self::Inferred => Self::Postprocessed,
            Self::Postprocessed | Self::Completed => Self::Completed,
            Self::Failed { .. } => self.clone(),
        }
    }

    /// The stage that runs to leave this state.
    pub const fn pending_stage(&self) -> Option<Stage> {
        match self {
            Self::Received => Some(Stage::Validation),
            Self::Validated => Some(Stage::Preprocessing),
            Self::Preprocessed => Some(Stage::Inference),
            Self::Inferred => Some(Stage::Postprocessing),
            Self::Postprocessed | Self::Completed | Self::Failed { .. } => None,
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }

    fn fail(error: &PipelineError) -> Self {
        Self::Failed {
            stage: error.stage(),
            message: error.to_string(),
        }
    }
}

pub struct EnhancePipeline<M: ?Sized> {
    model: Arc<M>,
    store: ImageStore,
}

impl<M: ImageToImageModel + ?Sized> EnhancePipeline<M> {
    pub fn new(model: Arc<M>, store: ImageStore) -> Self {
        Self { model, store }
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    /// Runs one upload to completion. On success returns the sanitized filename under which
    /// both the upload and its generated image are stored.
    pub fn process(&self, upload: Option<UploadedImage>) -> PipelineResult {
        let started = Instant::now();
        let mut state = PipelineState::Received;

        let result = self.run(upload, &mut state);
        match &result {
            Ok(filename) => tracing::info!(
                filename = %filename,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Generated image"
            ),
            Err(e) => {
                tracing::warn!(stage = %e.stage(), "Request failed: {}", e);
                state = PipelineState::fail(e);
            }
        }
        debug_assert!(state.is_terminal());
        result
    }

    fn run(&self, upload: Option<UploadedImage>, state: &mut PipelineState) -> PipelineResult {
        let (filename, bytes) = validate(upload)?;
        advance(state);

        // Held until both files for this name are written.
        let _guard = self.store.lock(&filename);

        let upload_path = self.store.upload_path(&filename);
        write_atomic(&upload_path, &bytes).map_err(|source| PreprocessError::Store {
            path: upload_path.clone(),
            source,
        })?;
        let input = preprocess(&bytes)?;
        advance(state);

        let output = infer(self.model.as_ref(), &input)?;
        advance(state);

        postprocess(&output, &self.store.generated_path(&filename))?;
        advance(state);

        // Completed: the filename is the result's identity.
        advance(state);
        Ok(filename)
    }
}

fn advance(state: &mut PipelineState) {
    let next = state.next();
    match state.pending_stage() {
        Some(stage) => tracing::debug!("{} done: {:?} -> {:?}", stage, state, next),
        None => tracing::debug!("Pipeline {:?} -> {:?}", state, next),
    }
    *state = next;
}

fn validate(upload: Option<UploadedImage>) -> Result<(String, Vec<u8>), PipelineError> {
    let upload = upload.ok_or(ValidationError::NoFilePart)?;
    if upload.filename.is_empty() {
        return Err(ValidationError::NoSelectedFile.into());
    }

    let filename =
        secure_filename(&upload.filename).ok_or_else(|| ValidationError::InvalidFilename {
            name: upload.filename.clone(),
        })?;
    // Checked before anything is stored, so an unwritable result never leaves an orphan upload.
    if output_format(Path::new(&filename)).is_none() {
        return Err(ValidationError::UnsupportedFormat { name: filename }.into());
    }
    if upload.bytes.is_empty() {
        return Err(ValidationError::EmptyFile.into());
    }

    Ok((filename, upload.bytes))
}
