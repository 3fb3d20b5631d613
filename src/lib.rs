pub mod config;
pub mod errors;
pub mod inference;
pub mod model;
pub mod pipeline;
pub mod postprocess;
pub mod preprocess;
pub mod storage;
pub mod tensor;
pub mod traits;
pub mod web;

pub mod mocks;

pub use config::Config;
pub use errors::{
    EnhanceError, InferenceError, PipelineError, PipelineResult, PostprocessError,
    PreprocessError, Result, Stage, ValidationError,
};
pub use inference::infer;
pub use model::Model;
pub use pipeline::{EnhancePipeline, PipelineState, UploadedImage};
pub use postprocess::postprocess;
pub use preprocess::{preprocess, preprocess_path};
pub use storage::{secure_filename, ImageStore};
pub use tensor::{InputTensor, OutputTensor, INPUT_SHAPE};
pub use traits::*;
