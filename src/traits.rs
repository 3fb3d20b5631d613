use ndarray::prelude::*;

use crate::errors::InferenceError;

/// An image-to-image generator treated as a black box: one NHWC tensor in, one out.
///
/// The pipeline depends on this abstraction rather than on the ONNX session, so tests can
/// substitute a stub (see [`crate::mocks`]).
pub trait ImageToImageModel: Send + Sync {
    /// One stateless forward pass.
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>, InferenceError>;
}

impl<M: ImageToImageModel + ?Sized> ImageToImageModel for std::sync::Arc<M> {
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>, InferenceError> {
        (**self).predict(tensor)
    }
}
