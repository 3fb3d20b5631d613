use std::path::Path;

use ndarray::prelude::*;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
    value::TensorRef,
};
use parking_lot::Mutex;

use crate::{
    errors::{EnhanceError, InferenceError, Result},
    tensor::{check_shape, INPUT_SHAPE},
    traits::ImageToImageModel,
};

/// The pretrained generator, loaded once from an ONNX graph.
///
/// `Session::run` needs exclusive access, so forward passes are serialized through the mutex.
pub struct Model {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    input_dims: Vec<i64>,
}

impl Model {
    pub fn new(model_path: &Path, device_id: i32, intra_threads: usize) -> Result<Self> {
        let session = SessionBuilder::new()
            .map_err(|e| model_error("session builder", e))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(|e| model_error("register execution providers", e))?
            .with_intra_threads(intra_threads)
            .map_err(|e| model_error("set intra-op threads", e))?
            .with_memory_pattern(true)
            .map_err(|e| model_error("enable memory pattern", e))?
            .commit_from_file(model_path)
            .map_err(|e| model_error(&format!("load {}", model_path.display()), e))?;

        let input = session.inputs.first().ok_or_else(|| missing("model has no inputs"))?;
        let input_name = input.name.clone();
        let input_dims = input
            .input_type
            .tensor_shape()
            .ok_or_else(|| missing("model input is not a tensor"))?
            .to_vec();
        let output_name = session
            .outputs
            .first()
            .ok_or_else(|| missing("model has no outputs"))?
            .name
            .clone();

        tracing::info!(
            "Loaded model {} (input {:?} {:?}, output {:?})",
            model_path.display(),
            input_name,
            input_dims,
            output_name
        );

        let model = Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            input_dims,
        };
        model.warm_up()?;
        Ok(model)
    }

    fn warm_up(&self) -> Result<()> {
        if let Err(e) = check_shape(&self.input_dims, &INPUT_SHAPE) {
            tracing::warn!("Model input does not accept {:?}: {}", INPUT_SHAPE, e);
            return Ok(());
        }

        let data = Array4::<f32>::zeros(INPUT_SHAPE);
        self.predict(data.view()).map_err(|e| EnhanceError::Model {
            operation: "warm-up forward pass".to_string(),
            source: Box::new(e),
        })?;
        Ok(())
    }
}

impl ImageToImageModel for Model {
    fn predict(&self, tensor: ArrayView4<f32>) -> std::result::Result<Array4<f32>, InferenceError> {
        check_shape(&self.input_dims, tensor.shape())?;

        let input = tensor.as_standard_layout();
        let value = TensorRef::from_array_view(&input).map_err(InferenceError::runtime)?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => value])
            .map_err(InferenceError::runtime)?;

        let output = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(InferenceError::runtime)?
            .into_dimensionality::<Ix4>()
            .map_err(|e| InferenceError::InvalidOutput {
                reason: e.to_string(),
            })?
            .to_owned();
        Ok(output)
    }
}

fn model_error<E>(operation: &str, err: E) -> EnhanceError
where
    E: std::error::Error + Send + Sync + 'static,
{
    EnhanceError::Model {
        operation: operation.to_string(),
        source: Box::new(err),
    }
}

fn missing(reason: &str) -> EnhanceError {
    EnhanceError::Model {
        operation: "inspect model signature".to_string(),
        source: Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, reason)),
    }
}
