//! Core types for white-background generation

use crate::error::{Result, WhiteBgError};
use image::{DynamicImage, GrayImage, ImageBuffer, RgbaImage};
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Anything the pipeline can load an image from
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Image file on disk
    Path(PathBuf),
    /// Already decoded image
    Image(DynamicImage),
    /// `H x W x C` array of 8-bit samples, `C` in {1, 3, 4}
    Array(Array3<u8>),
    /// `H x W x C` array of floating point samples in `[0, 1]`
    FloatArray(Array3<f32>),
}

impl ImageSource {
    /// Path of the source when it is a file
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Path(path) => Some(path),
            _ => None,
        }
    }

    /// Short description for logs
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Image(image) => format!("in-memory image {}x{}", image.width(), image.height()),
            Self::Array(array) => format!("u8 array {:?}", array.dim()),
            Self::FloatArray(array) => format!("f32 array {:?}", array.dim()),
        }
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&PathBuf> for ImageSource {
    fn from(path: &PathBuf) -> Self {
        Self::Path(path.clone())
    }
}

impl From<&str> for ImageSource {
    fn from(path: &str) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

impl From<DynamicImage> for ImageSource {
    fn from(image: DynamicImage) -> Self {
        Self::Image(image)
    }
}

impl From<Array3<u8>> for ImageSource {
    fn from(array: Array3<u8>) -> Self {
        Self::Array(array)
    }
}

impl From<Array3<f32>> for ImageSource {
    fn from(array: Array3<f32>) -> Self {
        Self::FloatArray(array)
    }
}

/// Single-channel foreground mask, same size as its source image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    /// Mask data as grayscale values (0-255), row major
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    /// Create a new segmentation mask
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    /// Create mask from a grayscale image
    #[must_use]
    pub fn from_image(image: &GrayImage) -> Self {
        Self::new(image.as_raw().clone(), image.dimensions())
    }

    fn check_length(&self) -> Result<()> {
        let (width, height) = self.dimensions;
        let expected = u64::from(width) * u64::from(height);
        if self.data.len() as u64 == expected {
            Ok(())
        } else {
            Err(WhiteBgError::internal(format!(
                "Mask data has {} values but {width}x{height} needs {expected}",
                self.data.len()
            )))
        }
    }

    /// Convert mask to a grayscale image
    ///
    /// # Errors
    /// - `WhiteBgError::Internal` when the data length does not match the dimensions
    pub fn to_image(&self) -> Result<GrayImage> {
        self.check_length()?;
        let (width, height) = self.dimensions;
        ImageBuffer::from_raw(width, height, self.data.clone())
            .ok_or_else(|| WhiteBgError::internal("Mask data does not match its dimensions"))
    }

    /// Build an RGBA cutout: source colours with the mask as alpha
    ///
    /// Fully transparent pixels are zeroed.
    pub fn cutout(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let rgb = image.to_rgb8();
        if rgb.dimensions() != self.dimensions {
            return Err(WhiteBgError::internal(format!(
                "Image ({}x{}) and mask ({}x{}) dimensions do not match",
                rgb.width(),
                rgb.height(),
                self.dimensions.0,
                self.dimensions.1
            )));
        }

        self.check_length()?;

        let (width, height) = self.dimensions;
        let mut rgba = RgbaImage::new(width, height);
        for ((dst, src), &alpha) in rgba.pixels_mut().zip(rgb.pixels()).zip(&self.data) {
            *dst = if alpha == 0 {
                image::Rgba([0, 0, 0, 0])
            } else {
                image::Rgba([src[0], src[1], src[2], alpha])
            };
        }
        Ok(rgba)
    }

    /// Fraction of pixels with a non-zero mask value
    #[must_use]
    pub fn foreground_ratio(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let foreground = self.data.iter().filter(|&&v| v > 0).count();
        foreground as f32 / self.data.len() as f32
    }
}

/// Which segmentation path produced the alpha channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentationOutcome {
    /// Pretrained model through the model session
    Model,
    /// Classical GrabCut fallback
    Classical,
    /// Segmentation failed; the original image was returned fully opaque
    Passthrough,
}

impl std::fmt::Display for SegmentationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Model => write!(f, "model"),
            Self::Classical => write!(f, "grabcut"),
            Self::Passthrough => write!(f, "passthrough"),
        }
    }
}

/// Per-stage timings in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Loading or converting the source
    pub load_ms: u64,
    /// Bounded downscale
    pub resize_ms: u64,
    /// Segmentation (model, fallback or passthrough)
    pub segmentation_ms: u64,
    /// Compositing over white
    pub composite_ms: u64,
    /// Encoding and writing the output
    pub save_ms: u64,
    /// Whole pipeline
    pub total_ms: u64,
}

/// Result of processing one image
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// RGB (white background) or RGBA (transparent) output image
    pub image: DynamicImage,
    /// Where the image was written, after any extension rewrite
    pub saved_to: Option<PathBuf>,
    /// Segmentation path that produced the alpha channel
    pub segmentation: SegmentationOutcome,
    /// Dimensions of the source before resizing
    pub original_dimensions: (u32, u32),
    /// Per-stage timings
    pub timings: ProcessingTimings,
}

/// One failed batch item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemFailure {
    /// Input that failed
    pub input: PathBuf,
    /// Error message
    pub error: String,
}

/// Outcome of a batch run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Output paths of successful items, in input order
    pub outputs: Vec<PathBuf>,
    /// Failed items, in input order
    pub failures: Vec<BatchItemFailure>,
    /// Number of inputs submitted
    pub total: usize,
    /// Whether the run stopped early on cancellation
    pub cancelled: bool,
}

impl BatchReport {
    /// Number of successfully processed items
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outputs.len()
    }

    /// Number of inputs neither processed nor failed
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.total
            .saturating_sub(self.outputs.len() + self.failures.len())
    }

    /// `succeeded/total` summary
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{}/{}", self.succeeded(), self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    #[test]
    fn test_mask_image_round_trip() {
        let gray = GrayImage::from_fn(4, 3, |x, y| Luma([(x * 10 + y) as u8]));
        let mask = SegmentationMask::from_image(&gray);
        assert_eq!(mask.dimensions, (4, 3));
        assert_eq!(mask.to_image().unwrap(), gray);
    }

    #[test]
    fn test_mask_with_wrong_length_fails() {
        let mask = SegmentationMask::new(vec![0; 5], (2, 2));
        assert!(mask.to_image().is_err());

        let short = SegmentationMask::new(vec![0; 3], (2, 2));
        assert!(short.to_image().is_err());
    }

    #[test]
    fn test_cutout_rejects_short_mask() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([9, 9, 9])));
        let mask = SegmentationMask::new(vec![255; 3], (2, 2));
        assert!(matches!(mask.cutout(&image), Err(WhiteBgError::Internal(_))));

        let long = SegmentationMask::new(vec![255; 5], (2, 2));
        assert!(long.cutout(&image).is_err());
    }

    #[test]
    fn test_cutout_uses_mask_as_alpha() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 1, Rgb([10, 20, 30])));
        let mask = SegmentationMask::new(vec![0, 200], (2, 1));
        let cutout = mask.cutout(&image).unwrap();

        assert_eq!(cutout.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(cutout.get_pixel(1, 0).0, [10, 20, 30, 200]);
    }

    #[test]
    fn test_cutout_dimension_mismatch() {
        let image = DynamicImage::new_rgb8(3, 3);
        let mask = SegmentationMask::new(vec![255; 4], (2, 2));
        assert!(mask.cutout(&image).is_err());
    }

    #[test]
    fn test_foreground_ratio() {
        let mask = SegmentationMask::new(vec![0, 0, 255, 255], (2, 2));
        assert!((mask.foreground_ratio() - 0.5).abs() < f32::EPSILON);
        assert_eq!(SegmentationMask::new(vec![], (0, 0)).foreground_ratio(), 0.0);
    }

    #[test]
    fn test_batch_report_summary() {
        let report = BatchReport {
            outputs: vec![PathBuf::from("a"), PathBuf::from("b")],
            failures: vec![BatchItemFailure {
                input: PathBuf::from("c"),
                error: "corrupt".to_string(),
            }],
            total: 4,
            cancelled: true,
        };
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.summary(), "2/4");
    }

    #[test]
    fn test_image_source_conversions() {
        let source = ImageSource::from("photo.jpg");
        assert_eq!(source.path(), Some(Path::new("photo.jpg")));

        let source = ImageSource::from(DynamicImage::new_rgb8(3, 2));
        assert!(source.path().is_none());
        assert!(source.describe().contains("3x2"));

        let source = ImageSource::from(Array3::<u8>::zeros((2, 3, 3)));
        assert!(source.describe().contains("(2, 3, 3)"));
    }
}
