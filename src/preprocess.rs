//! Raw upload bytes to the generator's input tensor.
//!
//! Every image is forced to RGB and squashed to [`INPUT_SIZE`] x [`INPUT_SIZE`] without
//! preserving the aspect ratio. Non-square inputs come out distorted; that is the
//! resolution and layout the generator was trained on.

use std::path::Path;

use image::{imageops, imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::prelude::*;
use nshare::AsNdarray3;

use crate::errors::PreprocessError;
use crate::tensor::{InputTensor, INPUT_SIZE};

/// Maps an 8-bit sample into `[-1.0, 1.0]`.
pub fn normalize(value: u8) -> f32 {
    f32::from(value) / 127.5 - 1.0
}

pub fn preprocess(bytes: &[u8]) -> Result<InputTensor, PreprocessError> {
    let image =
        image::load_from_memory(bytes).map_err(|source| PreprocessError::Decode { source })?;
    image_to_tensor(&image)
}

pub fn preprocess_path(path: &Path) -> Result<InputTensor, PreprocessError> {
    let bytes = std::fs::read(path).map_err(|source| PreprocessError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    preprocess(&bytes)
}

pub fn image_to_tensor(image: &DynamicImage) -> Result<InputTensor, PreprocessError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(PreprocessError::Convert {
            reason: format!("image has no pixels ({}x{})", width, height),
        });
    }

    // Alpha and palette information is dropped, not composited.
    let rgb = image.to_rgb8();
    let size = INPUT_SIZE as u32;
    let resized = imageops::resize(&rgb, size, size, FilterType::CatmullRom);

    // CHW view -> NHWC
    let tensor = resized
        .as_ndarray3()
        .permuted_axes([1, 2, 0])
        .insert_axis(Axis(0))
        .mapv(normalize);

    Ok(InputTensor::new(tensor.as_standard_layout().into_owned()))
}
