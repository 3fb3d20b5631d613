use ndarray::prelude::*;
use thiserror::Error;

use crate::errors::InferenceError;
use crate::tensor::{check_shape, input_dims};
use crate::traits::ImageToImageModel;

/// Stub generators for exercising the pipeline without an ONNX model.
///
/// Every variant except `Expecting` checks the input against the (1, 128, 128, 3) shape,
/// like the real model does.
#[derive(Debug, Clone)]
pub enum MockGenerator {
    /// Returns its input unchanged.
    Identity,
    /// Returns a tensor of the input's shape filled with one value.
    Constant(f32),
    /// Fails like a numeric runtime error.
    Failing(String),
    /// Panics during the forward pass.
    Panicking(String),
    /// Declares these input dimensions instead of the standard shape.
    Expecting(Vec<i64>),
    /// Returns an output with this many channels.
    Channels(usize),
}

#[derive(Error, Debug)]
#[error("{0}")]
struct MockRuntimeError(String);

impl ImageToImageModel for MockGenerator {
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>, InferenceError> {
        match self {
            Self::Expecting(dims) => check_shape(dims, tensor.shape())?,
            _ => check_shape(&input_dims(), tensor.shape())?,
        }

        let (n, h, w, c) = tensor.dim();
        match self {
            Self::Identity | Self::Expecting(_) => Ok(tensor.to_owned()),
            Self::Constant(value) => Ok(Array4::from_elem((n, h, w, c), *value)),
            Self::Failing(message) => Err(InferenceError::runtime(MockRuntimeError(
                message.clone(),
            ))),
            Self::Panicking(message) => panic!("{}", message),
            Self::Channels(channels) => Ok(Array4::zeros((n, h, w, *channels))),
        }
    }
}
