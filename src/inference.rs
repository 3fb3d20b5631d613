use std::panic::{self, AssertUnwindSafe};

use crate::errors::InferenceError;
use crate::tensor::{InputTensor, OutputTensor};
use crate::traits::ImageToImageModel;

/// Runs one forward pass. Runtime faults, including panics inside the model, come back
/// as [`InferenceError`]s.
pub fn infer<M>(model: &M, tensor: &InputTensor) -> Result<OutputTensor, InferenceError>
where
    M: ImageToImageModel + ?Sized,
{
    match panic::catch_unwind(AssertUnwindSafe(|| model.predict(tensor.view()))) {
        Ok(output) => output.map(OutputTensor::new),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            Err(InferenceError::Panicked { message })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockGenerator;
    use crate::preprocess::image_to_tensor;
    use image::DynamicImage;

    fn input() -> InputTensor {
        image_to_tensor(&DynamicImage::new_rgb8(32, 32)).unwrap()
    }

    #[test]
    fn test_identity_forward_pass() -> Result<(), InferenceError> {
        let tensor = input();
        let output = infer(&MockGenerator::Identity, &tensor)?;
        assert_eq!(output.view(), tensor.view());
        Ok(())
    }

    #[test]
    fn test_runtime_error_keeps_message() {
        let model = MockGenerator::Failing("device lost".to_string());
        let err = infer(&model, &input()).unwrap_err();
        assert!(matches!(err, InferenceError::Runtime { .. }));
        assert_eq!(err.to_string(), "device lost");
    }

    #[test]
    fn test_panic_is_caught() {
        let model = MockGenerator::Panicking("kernel exploded".to_string());
        let err = infer(&model, &input()).unwrap_err();
        assert!(matches!(err, InferenceError::Panicked { .. }));
        assert!(err.to_string().contains("kernel exploded"));
    }

    #[test]
    fn test_shape_mismatch() {
        let model = MockGenerator::Expecting(vec![1, 256, 256, 3]);
        let err = infer(&model, &input()).unwrap_err();
        assert!(matches!(err, InferenceError::ShapeMismatch { .. }));
    }
}
