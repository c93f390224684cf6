//! Segmentation backend abstraction and the fallback chain around it

use crate::{compositor, error::Result, types::SegmentationOutcome};
use image::DynamicImage;

/// Trait for foreground segmentation backends
///
/// A backend turns a colour image into an RGBA cutout of the same size whose
/// alpha channel encodes foreground opacity.
pub trait SegmentationBackend: Send {
    /// Segment the foreground of an image
    ///
    /// # Errors
    /// - Inference failures in the model session
    /// - Images the algorithm cannot seed (for example a degenerate rectangle)
    fn segment(&mut self, image: &DynamicImage) -> Result<DynamicImage>;

    /// Which segmentation path this backend represents
    fn kind(&self) -> SegmentationOutcome;

    /// Whether a model session is loaded behind this backend
    fn is_model_loaded(&self) -> bool {
        false
    }

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// Owns the selected backend and contains its failures
///
/// A failing backend never surfaces an error: the original image is returned
/// fully opaque instead and the failure is logged.
pub struct SegmentationProvider {
    backend: Box<dyn SegmentationBackend>,
}

impl SegmentationProvider {
    /// Wrap a backend
    #[must_use]
    pub fn new(backend: Box<dyn SegmentationBackend>) -> Self {
        Self { backend }
    }

    /// Segment an image, degrading to a fully opaque copy on failure
    pub fn segment(&mut self, image: &DynamicImage) -> (DynamicImage, SegmentationOutcome) {
        match self.backend.segment(image) {
            Ok(cutout) => (cutout, self.backend.kind()),
            Err(e) => {
                log::error!(
                    "Segmentation with {} failed, keeping the original image: {}",
                    self.backend.name(),
                    e
                );
                (
                    compositor::with_full_opacity(image),
                    SegmentationOutcome::Passthrough,
                )
            },
        }
    }

    /// The backend in use
    #[must_use]
    pub fn backend(&self) -> &dyn SegmentationBackend {
        self.backend.as_ref()
    }
}
