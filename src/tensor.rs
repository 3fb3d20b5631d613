use ndarray::prelude::*;

use crate::errors::InferenceError;

/// Spatial size the generator was trained on.
pub const INPUT_SIZE: usize = 128;
pub const INPUT_CHANNELS: usize = 3;
/// NHWC, single-image batch.
pub const INPUT_SHAPE: [usize; 4] = [1, INPUT_SIZE, INPUT_SIZE, INPUT_CHANNELS];

/// A preprocessed image: shape [`INPUT_SHAPE`], values in `[-1.0, 1.0]`.
///
/// Only [`crate::preprocess`] builds these, so the shape and range hold by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor(Array4<f32>);

impl InputTensor {
    pub(crate) fn new(array: Array4<f32>) -> Self {
        debug_assert_eq!(array.shape(), INPUT_SHAPE);
        Self(array)
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.0.view()
    }

    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    pub fn into_inner(self) -> Array4<f32> {
        self.0
    }
}

/// Raw generator output, NHWC. Values are unnormalized.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor(Array4<f32>);

impl OutputTensor {
    pub fn new(array: Array4<f32>) -> Self {
        Self(array)
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.0.view()
    }

    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    pub fn into_inner(self) -> Array4<f32> {
        self.0
    }
}

impl From<Array4<f32>> for OutputTensor {
    fn from(array: Array4<f32>) -> Self {
        Self::new(array)
    }
}

/// Compares an actual tensor shape against declared dimensions, where a negative
/// declared dimension is dynamic and accepts any size.
pub fn check_shape(expected: &[i64], actual: &[usize]) -> Result<(), InferenceError> {
    let matches = expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual)
            .all(|(&e, &a)| e < 0 || e as usize == a);

    if matches {
        Ok(())
    } else {
        Err(InferenceError::ShapeMismatch {
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        })
    }
}

/// Declared dimensions of [`INPUT_SHAPE`], for stubs and diagnostics.
pub fn input_dims() -> Vec<i64> {
    INPUT_SHAPE.iter().map(|&d| d as i64).collect()
}
