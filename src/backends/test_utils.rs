//! Test utilities and mock backends for testing segmentation functionality
//!
//! These mocks implement `SegmentationBackend` so the provider and the
//! generator can be exercised without model files or ONNX Runtime.

use crate::{
    error::{Result, WhiteBgError},
    inference::SegmentationBackend,
    types::SegmentationOutcome,
};
use image::{DynamicImage, Rgba, RgbaImage};
use std::sync::{Arc, Mutex};

/// Backend that always fails and counts its calls
#[derive(Debug, Clone, Default)]
pub struct FailingBackend {
    calls: Arc<Mutex<usize>>,
}

impl FailingBackend {
    /// Create a new failing backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared call counter for verification in tests
    #[must_use]
    pub fn call_count(&self) -> Arc<Mutex<usize>> {
        Arc::clone(&self.calls)
    }
}

impl SegmentationBackend for FailingBackend {
    fn segment(&mut self, _image: &DynamicImage) -> Result<DynamicImage> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        Err(WhiteBgError::segmentation("Mock segmentation failure"))
    }

    fn kind(&self) -> SegmentationOutcome {
        SegmentationOutcome::Model
    }

    fn is_model_loaded(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Backend that attaches one constant alpha value to every pixel
#[derive(Debug, Clone)]
pub struct FixedAlphaBackend {
    alpha: u8,
    calls: Arc<Mutex<usize>>,
}

impl FixedAlphaBackend {
    /// Create a backend producing `alpha` everywhere
    #[must_use]
    pub fn new(alpha: u8) -> Self {
        Self {
            alpha,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Shared call counter for verification in tests
    #[must_use]
    pub fn call_count(&self) -> Arc<Mutex<usize>> {
        Arc::clone(&self.calls)
    }
}

impl SegmentationBackend for FixedAlphaBackend {
    fn segment(&mut self, image: &DynamicImage) -> Result<DynamicImage> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        let rgb = image.to_rgb8();
        let alpha = self.alpha;
        let rgba = RgbaImage::from_fn(rgb.width(), rgb.height(), |x, y| {
            let [r, g, b] = rgb.get_pixel(x, y).0;
            Rgba([r, g, b, alpha])
        });
        Ok(DynamicImage::ImageRgba8(rgba))
    }

    fn kind(&self) -> SegmentationOutcome {
        SegmentationOutcome::Classical
    }

    fn name(&self) -> &'static str {
        "fixed-alpha"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failing_backend_counts_calls() {
        let mut backend = FailingBackend::new();
        let calls = backend.call_count();
        assert!(backend.segment(&DynamicImage::new_rgb8(2, 2)).is_err());
        assert!(backend.segment(&DynamicImage::new_rgb8(2, 2)).is_err());
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn test_fixed_alpha_backend() {
        let mut backend = FixedAlphaBackend::new(128);
        let output = backend.segment(&DynamicImage::new_rgb8(3, 2)).unwrap();
        assert_eq!((output.width(), output.height()), (3, 2));
        assert!(output.to_rgba8().pixels().all(|p| p[3] == 128));
    }
}
