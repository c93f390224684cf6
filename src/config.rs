//! Configuration types for white-background generation

use crate::error::{Result, WhiteBgError};
use crate::models::ModelName;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default JPEG encoder quality
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Default file-name prefix for batch outputs
pub const DEFAULT_BATCH_PREFIX: &str = "white_bg_";

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// What the pipeline writes after segmentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputMode {
    /// Composite the foreground over an opaque white background (RGB)
    #[default]
    WhiteBackground,
    /// Keep the alpha channel and always write PNG
    TransparentPng,
}

impl OutputMode {
    /// Whether the mode keeps the alpha channel
    #[must_use]
    pub fn keeps_alpha(self) -> bool {
        matches!(self, Self::TransparentPng)
    }
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WhiteBackground => write!(f, "white-bg"),
            Self::TransparentPng => write!(f, "transparent-png"),
        }
    }
}

/// Segmentation libraries compiled into this build
///
/// Computed once and carried in [`PipelineConfig`] so the pipeline never
/// checks for optional libraries at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationCapabilities {
    /// ONNX Runtime model execution is available
    pub model_runtime: bool,
}

impl SegmentationCapabilities {
    /// Capabilities of the current build
    #[must_use]
    pub fn detect() -> Self {
        Self {
            model_runtime: cfg!(feature = "onnx"),
        }
    }

    /// Capabilities with only the classical fallback
    #[must_use]
    pub fn classical_only() -> Self {
        Self {
            model_runtime: false,
        }
    }
}

impl Default for SegmentationCapabilities {
    fn default() -> Self {
        Self::detect()
    }
}

/// Configuration for one generator instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Segmentation model to load
    pub model: ModelName,
    /// Request hardware acceleration for model inference
    pub enable_gpu: bool,
    /// Downscale so the longer side is at most this many pixels
    pub resize_max: Option<u32>,
    /// White background compositing or transparent PNG passthrough
    pub output_mode: OutputMode,
    /// File-name prefix for batch outputs
    pub prefix: String,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Directory holding model weights (`U2NET_HOME` or `~/.u2net` when unset)
    pub model_dir: Option<PathBuf>,
    /// Libraries available to the segmentation provider
    pub capabilities: SegmentationCapabilities,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: ModelName::default(),
            enable_gpu: true,
            resize_max: None,
            output_mode: OutputMode::default(),
            prefix: DEFAULT_BATCH_PREFIX.to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            model_dir: None,
            capabilities: SegmentationCapabilities::detect(),
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Execution provider derived from the GPU toggle
    #[must_use]
    pub fn execution_provider(&self) -> ExecutionProvider {
        if self.enable_gpu {
            ExecutionProvider::Auto
        } else {
            ExecutionProvider::Cpu
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// - JPEG quality outside 1-100
    /// - Resize target of zero
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(WhiteBgError::config_value_error(
                "JPEG quality",
                self.jpeg_quality,
                "1-100",
                Some(DEFAULT_JPEG_QUALITY),
            ));
        }

        if self.resize_max == Some(0) {
            return Err(WhiteBgError::config_value_error(
                "resize target",
                0,
                "1 or more pixels",
                None,
            ));
        }

        Ok(())
    }
}

/// Builder for `PipelineConfig`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the segmentation model
    #[must_use]
    pub fn model(mut self, model: ModelName) -> Self {
        self.config.model = model;
        self
    }

    /// Enable or disable hardware acceleration
    #[must_use]
    pub fn enable_gpu(mut self, enable: bool) -> Self {
        self.config.enable_gpu = enable;
        self
    }

    /// Set the longest-side resize target
    #[must_use]
    pub fn resize_max(mut self, max_side: Option<u32>) -> Self {
        self.config.resize_max = max_side;
        self
    }

    /// Set the output mode
    #[must_use]
    pub fn output_mode(mut self, mode: OutputMode) -> Self {
        self.config.output_mode = mode;
        self
    }

    /// Set the batch output prefix
    #[must_use]
    pub fn prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.prefix = prefix.into();
        self
    }

    /// Set JPEG quality
    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality;
        self
    }

    /// Set the model weights directory
    #[must_use]
    pub fn model_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.config.model_dir = dir;
        self
    }

    /// Override the detected segmentation capabilities
    #[must_use]
    pub fn capabilities(mut self, capabilities: SegmentationCapabilities) -> Self {
        self.config.capabilities = capabilities;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any validation failure reported by [`PipelineConfig::validate`]
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
