//! Segmentation model registry
//!
//! Describes the pretrained salient-object models the generator can run,
//! together with the preprocessing each one expects and where its weights
//! are published.

use crate::error::{Result, WhiteBgError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Release location of the published model weights
pub const MODEL_RELEASE_URL: &str = "https://github.com/danielgatis/rembg/releases/download/v0.0.0";

/// Mean and standard deviation used by the U²-Net family (ImageNet statistics)
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Recognised segmentation models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ModelName {
    /// General purpose U²-Net
    #[default]
    #[serde(rename = "u2net")]
    U2net,
    /// Lightweight U²-Net
    #[serde(rename = "u2netp")]
    U2netp,
    /// U²-Net trained for human segmentation
    #[serde(rename = "u2net_human_seg")]
    U2netHumanSeg,
    /// Silhouette-oriented U²-Net variant
    #[serde(rename = "silueta")]
    Silueta,
    /// IS-Net general use model
    #[serde(rename = "isnet-general-use")]
    IsnetGeneralUse,
}

/// Preprocessing parameters for a model's input tensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Model input size `[width, height]`
    pub target_size: [u32; 2],
    /// Per-channel mean subtracted after scaling to `[0, 1]`
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation divided after mean subtraction
    pub normalization_std: [f32; 3],
}

impl ModelName {
    /// Every model in registry order
    pub const ALL: [ModelName; 5] = [
        ModelName::U2net,
        ModelName::U2netp,
        ModelName::U2netHumanSeg,
        ModelName::Silueta,
        ModelName::IsnetGeneralUse,
    ];

    /// Canonical model name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::U2net => "u2net",
            Self::U2netp => "u2netp",
            Self::U2netHumanSeg => "u2net_human_seg",
            Self::Silueta => "silueta",
            Self::IsnetGeneralUse => "isnet-general-use",
        }
    }

    /// One-line description shown by `white-bg models`
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::U2net => "General purpose model (default)",
            Self::U2netp => "Lightweight version of u2net, faster but less accurate",
            Self::U2netHumanSeg => "Optimized for human segmentation",
            Self::Silueta => "Good for silhouettes and shapes",
            Self::IsnetGeneralUse => "High quality general purpose model",
        }
    }

    /// File name of the ONNX weights
    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.onnx", self.as_str())
    }

    /// Download URL of the ONNX weights
    #[must_use]
    pub fn download_url(self) -> String {
        format!("{}/{}", MODEL_RELEASE_URL, self.file_name())
    }

    /// Input preprocessing expected by the model
    #[must_use]
    pub fn preprocessing(self) -> PreprocessingConfig {
        match self {
            Self::U2net | Self::U2netp | Self::U2netHumanSeg | Self::Silueta => PreprocessingConfig {
                target_size: [320, 320],
                normalization_mean: IMAGENET_MEAN,
                normalization_std: IMAGENET_STD,
            },
            Self::IsnetGeneralUse => PreprocessingConfig {
                target_size: [1024, 1024],
                normalization_mean: [0.5, 0.5, 0.5],
                normalization_std: [1.0, 1.0, 1.0],
            },
        }
    }

    /// Names of all recognised models
    #[must_use]
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|m| m.as_str()).collect()
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelName {
    type Err = WhiteBgError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                WhiteBgError::invalid_config(format!(
                    "Unknown model '{}'. Available models: {}",
                    s,
                    Self::names().join(", ")
                ))
            })
    }
}

/// Snapshot of the generator's model state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Configured model
    pub model_name: String,
    /// Whether the model runtime was compiled in
    pub model_runtime_available: bool,
    /// Whether a model session is loaded
    pub session_loaded: bool,
    /// Whether hardware acceleration was requested
    pub gpu_enabled: bool,
    /// All recognised model names
    pub available_models: Vec<String>,
}
