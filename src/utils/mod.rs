//! Image helpers shared by the pipeline and the segmentation backends

pub mod preprocessing;
pub mod resize;

pub use preprocessing::{ImagePreprocessor, MaskPostprocessor};
pub use resize::Resizer;
