//! Model tensor preparation and mask post-processing
//!
//! Segmentation models take a square NCHW tensor of the stretched input and
//! produce a single-channel probability map of the same square size.

use crate::{
    error::{Result, WhiteBgError},
    models::PreprocessingConfig,
    types::SegmentationMask,
};
use image::{imageops::FilterType, DynamicImage, GrayImage};
use ndarray::{Array4, ArrayViewD, Axis};

/// Guard against division by zero for all-black inputs
const MIN_PIXEL_MAX: f32 = 1e-6;

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Build the model input tensor for an image
    ///
    /// The RGB image is stretched to the model's square input size, divided by
    /// its own maximum sample value and normalized per channel.
    ///
    /// # Errors
    /// - `WhiteBgError::InvalidInput` for empty images
    #[allow(clippy::cast_possible_truncation)]
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(WhiteBgError::invalid_input("Cannot preprocess an empty image"));
        }

        let [target_width, target_height] = preprocessing_config.target_size;
        let resized = image::imageops::resize(
            &image.to_rgb8(),
            target_width,
            target_height,
            FilterType::Lanczos3,
        );

        let max_value = resized
            .as_raw()
            .iter()
            .copied()
            .max()
            .map_or(0.0, f32::from)
            .max(MIN_PIXEL_MAX);

        let mut tensor =
            Array4::<f32>::zeros((1, 3, target_height as usize, target_width as usize));
        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;

        #[allow(clippy::indexing_slicing)]
        // Tensor dimensions are allocated from the resized image
        for (x, y, pixel) in resized.enumerate_pixels() {
            for channel in 0..3 {
                let value = f32::from(pixel[channel]) / max_value;
                tensor[[0, channel, y as usize, x as usize]] =
                    (value - mean[channel]) / std[channel];
            }
        }

        Ok(tensor)
    }
}

/// Converts raw model output into a mask at the source resolution
pub struct MaskPostprocessor;

impl MaskPostprocessor {
    /// Min-max normalize the first output map and scale it back up
    ///
    /// Accepts `[1, 1, H, W]`, `[1, H, W]` and `[H, W]` outputs.
    ///
    /// # Errors
    /// - `WhiteBgError::Inference` for outputs with an unexpected shape
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn tensor_to_mask(
        output: &ArrayViewD<'_, f32>,
        original_dimensions: (u32, u32),
    ) -> Result<SegmentationMask> {
        let mut map = output.view();
        while map.ndim() > 2 {
            if map.shape().first().copied() != Some(1) {
                return Err(WhiteBgError::inference(format!(
                    "Unexpected model output shape {:?}",
                    output.shape()
                )));
            }
            map = map.index_axis_move(Axis(0), 0);
        }

        let (height, width) = match map.shape() {
            [h, w] if *h > 0 && *w > 0 => (*h, *w),
            _ => {
                return Err(WhiteBgError::inference(format!(
                    "Unexpected model output shape {:?}",
                    output.shape()
                )))
            },
        };

        let (min, max) = map
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;

        let data: Vec<u8> = map
            .iter()
            .map(|&v| {
                let normalized = if range > f32::EPSILON {
                    (v - min) / range
                } else {
                    0.0
                };
                (normalized * 255.0).round().clamp(0.0, 255.0) as u8
            })
            .collect();

        let gray = GrayImage::from_raw(width as u32, height as u32, data)
            .ok_or_else(|| WhiteBgError::internal("Mask buffer does not match output shape"))?;

        let (orig_width, orig_height) = original_dimensions;
        let scaled = if gray.dimensions() == original_dimensions {
            gray
        } else {
            image::imageops::resize(&gray, orig_width, orig_height, FilterType::Lanczos3)
        };

        Ok(SegmentationMask::from_image(&scaled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use ndarray::{Array2, Array3, IxDyn};

    fn create_test_preprocessing_config() -> PreprocessingConfig {
        PreprocessingConfig {
            target_size: [32, 32],
            normalization_mean: [0.485, 0.456, 0.406],
            normalization_std: [0.229, 0.224, 0.225],
        }
    }

    fn create_test_image() -> DynamicImage {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(100, 50, Rgb([200, 0, 0]));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_preprocess_shape_is_square_nchw() {
        let tensor = ImagePreprocessor::preprocess_for_inference(
            &create_test_image(),
            &create_test_preprocessing_config(),
        )
        .unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 32, 32]);
    }

    #[test]
    fn test_preprocess_divides_by_image_max() {
        let config = create_test_preprocessing_config();
        let tensor = ImagePreprocessor::preprocess_for_inference(&create_test_image(), &config).unwrap();

        // Red channel is at the image maximum, so it normalizes from 1.0
        let expected_red = (1.0 - 0.485) / 0.229;
        let expected_green = (0.0 - 0.456) / 0.224;
        assert!((tensor[[0, 0, 16, 16]] - expected_red).abs() < 0.05);
        assert!((tensor[[0, 1, 16, 16]] - expected_green).abs() < 0.05);
    }

    #[test]
    fn test_preprocess_black_image_is_finite() {
        let image = DynamicImage::new_rgb8(8, 8);
        let tensor =
            ImagePreprocessor::preprocess_for_inference(&image, &create_test_preprocessing_config())
                .unwrap();
        assert!(tensor.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_tensor_to_mask_min_max_normalizes() {
        let output = Array2::from_shape_vec((2, 2), vec![0.0_f32, 1.0, 2.0, 0.0])
            .unwrap()
            .into_dyn();
        let mask = MaskPostprocessor::tensor_to_mask(&output.view(), (2, 2)).unwrap();
        assert_eq!(mask.data, vec![0, 128, 255, 0]);
    }

    #[test]
    fn test_tensor_to_mask_accepts_nchw_and_resizes() {
        let output = ndarray::Array4::<f32>::from_elem((1, 1, 4, 4), 0.5).into_dyn();
        let mask = MaskPostprocessor::tensor_to_mask(&output.view(), (10, 6)).unwrap();
        assert_eq!(mask.dimensions, (10, 6));
        // Constant output collapses to zero
        assert!(mask.data.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_tensor_to_mask_accepts_three_dims() {
        let output = Array3::<f32>::from_shape_fn((1, 3, 3), |(_, y, x)| (x + y) as f32).into_dyn();
        let mask = MaskPostprocessor::tensor_to_mask(&output.view(), (3, 3)).unwrap();
        assert_eq!(mask.data[0], 0);
        assert_eq!(mask.data[8], 255);
    }

    #[test]
    fn test_tensor_to_mask_rejects_batches() {
        let output = ndarray::ArrayD::<f32>::zeros(IxDyn(&[2, 1, 4, 4]));
        assert!(MaskPostprocessor::tensor_to_mask(&output.view(), (4, 4)).is_err());
    }
}
