//! Segmentation backends
//!
//! This module provides the two segmentation engines of the pipeline:
//! - ONNX Runtime backend (pretrained salient-object models, GPU acceleration)
//! - GrabCut backend (pure Rust classical fallback, no model files)

#[cfg(feature = "onnx")]
pub mod onnx;

pub mod grabcut;

// Test utilities for backend testing
#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

pub use self::grabcut::GrabCutBackend;
