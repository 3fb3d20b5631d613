//! Generator output tensor to an image file on disk.

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use ndarray::prelude::*;

use crate::errors::PostprocessError;
use crate::storage::write_atomic;
use crate::tensor::OutputTensor;

/// Maps a generator output value back toward the 8-bit range.
///
/// Not the exact inverse of [`crate::preprocess::normalize`], which divides by 127.5.
/// The generator was trained against this pair of scales, so the mismatch is kept.
pub fn rescale(value: f32) -> f32 {
    value * 128.0 + 128.0
}

fn to_sample(value: f32) -> u8 {
    rescale(value).round().clamp(0.0, 255.0) as u8
}

/// Converts the first batch element into an image of whatever size the tensor encodes.
pub fn tensor_to_image(tensor: &OutputTensor) -> Result<DynamicImage, PostprocessError> {
    let view = tensor.view();
    if view.len_of(Axis(0)) == 0 {
        return Err(PostprocessError::EmptyBatch);
    }

    let sample = view.index_axis(Axis(0), 0);
    let (height, width, channels) = sample.dim();
    let (w, h) = match (u32::try_from(width), u32::try_from(height)) {
        (Ok(w), Ok(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(PostprocessError::Dimensions { width, height }),
    };

    // Logical (row-major) iteration yields HWC-interleaved samples regardless of layout.
    let raw: Vec<u8> = sample.iter().map(|&v| to_sample(v)).collect();
    let dimensions = || PostprocessError::Dimensions { width, height };

    let image = match channels {
        1 => DynamicImage::ImageLuma8(GrayImage::from_raw(w, h, raw).ok_or_else(dimensions)?),
        3 => DynamicImage::ImageRgb8(RgbImage::from_raw(w, h, raw).ok_or_else(dimensions)?),
        4 => DynamicImage::ImageRgba8(RgbaImage::from_raw(w, h, raw).ok_or_else(dimensions)?),
        channels => return Err(PostprocessError::UnsupportedChannels { channels }),
    };

    Ok(image)
}

/// The encoding used for a destination path.
///
/// Unrecognized or missing extensions encode as PNG. Returns `None` when the extension
/// names a format whose encoder is not compiled in.
pub fn output_format(destination: &Path) -> Option<ImageFormat> {
    match ImageFormat::from_path(destination) {
        Ok(format) if format.writing_enabled() => Some(format),
        Ok(_) => None,
        Err(_) => Some(ImageFormat::Png),
    }
}

/// Encodes the output and writes it to `destination`.
///
/// The format follows [`output_format`]. The file is
/// replaced atomically, so a failed write never leaves a partial file behind.
pub fn postprocess(tensor: &OutputTensor, destination: &Path) -> Result<(), PostprocessError> {
    let image = tensor_to_image(tensor)?;
    let format =
        output_format(destination).ok_or_else(|| PostprocessError::UnsupportedFormat {
            path: destination.to_path_buf(),
        })?;

    let mut encoded = Cursor::new(Vec::new());
    image
        .write_to(&mut encoded, format)
        .map_err(|source| PostprocessError::Encode {
            path: destination.to_path_buf(),
            source,
        })?;

    write_atomic(destination, encoded.get_ref()).map_err(|source| PostprocessError::Io {
        path: destination.to_path_buf(),
        source,
    })?;

    tracing::debug!(
        "Wrote {}x{} {:?} image to {}",
        image.width(),
        image.height(),
        format,
        destination.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::{normalize, preprocess};
    use image::{GenericImageView, Rgb};
    use tempfile::TempDir;

    #[test]
    fn test_zero_tensor_is_mid_gray() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("gray.png");

        postprocess(&Array4::<f32>::zeros((1, 16, 24, 3)).into(), &path)?;

        let img = image::open(&path)?.to_rgb8();
        assert_eq!(img.dimensions(), (24, 16));
        assert!(img.pixels().all(|p| *p == Rgb([128, 128, 128])));
        Ok(())
    }

    #[test]
    fn test_output_format_by_extension() {
        let cases = [
            ("a.png", Some(ImageFormat::Png)),
            ("a.JPG", Some(ImageFormat::Jpeg)),
            ("a.bmp", Some(ImageFormat::Bmp)),
            ("a.gif", Some(ImageFormat::Gif)),
            ("a.tiff", Some(ImageFormat::Tiff)),
            ("a.txt", Some(ImageFormat::Png)),
            ("noext", Some(ImageFormat::Png)),
            ("a.exr", None),
        ];
        for (name, expected) in cases {
            assert_eq!(output_format(Path::new(name)), expected, "{}", name);
        }
    }

    #[test]
    fn test_writes_bmp_and_gif() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        for (name, format) in [("out.bmp", ImageFormat::Bmp), ("out.gif", ImageFormat::Gif)] {
            let path = temp_dir.path().join(name);
            postprocess(&Array4::<f32>::zeros((1, 8, 8, 3)).into(), &path)?;
            let reader = image::ImageReader::open(&path)?.with_guessed_format()?;
            assert_eq!(reader.format(), Some(format));
        }
        Ok(())
    }

    #[test]
    fn test_unwritable_format_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.exr");
        let err = postprocess(&Array4::<f32>::zeros((1, 8, 8, 3)).into(), &path).unwrap_err();
        assert!(matches!(err, PostprocessError::UnsupportedFormat { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_values_saturate() -> Result<(), PostprocessError> {
        let mut array = Array4::<f32>::zeros((1, 1, 2, 3));
        array[[0, 0, 0, 0]] = 2.0;
        array[[0, 0, 1, 2]] = -2.0;

        let img = tensor_to_image(&array.into())?.to_rgb8();
        assert_eq!(img.get_pixel(0, 0)[0], 255);
        assert_eq!(img.get_pixel(1, 0)[2], 0);
        Ok(())
    }

    #[test]
    fn test_only_first_batch_element_is_used() -> Result<(), PostprocessError> {
        let mut array = Array4::<f32>::zeros((2, 4, 4, 3));
        array.slice_mut(s![1, .., .., ..]).fill(1.0);

        let img = tensor_to_image(&array.into())?.to_rgb8();
        assert!(img.pixels().all(|p| *p == Rgb([128, 128, 128])));
        Ok(())
    }

    #[test]
    fn test_grayscale_and_alpha_outputs() -> Result<(), PostprocessError> {
        let gray = tensor_to_image(&Array4::<f32>::zeros((1, 5, 6, 1)).into())?;
        assert!(matches!(gray, DynamicImage::ImageLuma8(_)));
        assert_eq!(gray.dimensions(), (6, 5));

        let rgba = tensor_to_image(&Array4::<f32>::zeros((1, 5, 6, 4)).into())?;
        assert!(matches!(rgba, DynamicImage::ImageRgba8(_)));
        Ok(())
    }

    #[test]
    fn test_rejects_unusable_tensors() {
        let err = tensor_to_image(&Array4::<f32>::zeros((1, 4, 4, 2)).into()).unwrap_err();
        assert!(matches!(err, PostprocessError::UnsupportedChannels { channels: 2 }));

        let err = tensor_to_image(&Array4::<f32>::zeros((0, 4, 4, 3)).into()).unwrap_err();
        assert!(matches!(err, PostprocessError::EmptyBatch));

        let err = tensor_to_image(&Array4::<f32>::zeros((1, 0, 4, 3)).into()).unwrap_err();
        assert!(matches!(err, PostprocessError::Dimensions { .. }));
    }

    #[test]
    fn test_failed_write_leaves_no_file() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("missing_dir").join("out.png");

        let err = postprocess(&Array4::<f32>::zeros((1, 8, 8, 3)).into(), &path).unwrap_err();
        assert!(matches!(err, PostprocessError::Io { .. }));
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_round_trip_is_not_an_exact_inverse() -> Result<(), Box<dyn std::error::Error>> {
        // 127.5 in, 128 out: constant images drift upward by design.
        for value in [128u8, 200, 250] {
            assert_ne!(rescale(normalize(value)), f32::from(value));
        }

        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("round_trip.png");
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(128, 128, Rgb([200, 200, 200])));
        let mut bytes = Cursor::new(Vec::new());
        source.write_to(&mut bytes, ImageFormat::Png)?;

        let tensor = preprocess(bytes.get_ref())?;
        postprocess(&OutputTensor::new(tensor.into_inner()), &path)?;

        let img = image::open(&path)?.to_rgb8();
        assert_eq!(*img.get_pixel(64, 64), Rgb([201, 201, 201]));
        Ok(())
    }
}
