#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # white-bg
//!
//! Replace the background of an image with solid white, or keep it as a
//! transparent alpha channel.
//!
//! Segmentation runs through a pretrained salient-object model on ONNX Runtime
//! when the model is available, and through a pure Rust GrabCut
//! implementation otherwise. If segmentation fails altogether the original
//! image is kept, fully opaque, so a run never stops on a hard image.
//!
//! ## Features
//!
//! - **Models**: `u2net`, `u2netp`, `u2net_human_seg`, `silueta`, `isnet-general-use`
//! - **Fallback**: GrabCut (Gaussian mixtures + graph cut), no model files needed
//! - **Hardware Acceleration**: CUDA, `CoreML` and CPU execution providers
//! - **Model Management**: download into `~/.u2net` (or `U2NET_HOME`) with checksums
//! - **Batch Processing**: per-item failures are recorded, the batch continues
//! - **CLI Integration**: `white-bg` binary (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use white_bg::{OutputMode, PipelineConfig, WhiteBgGenerator};
//! use std::path::Path;
//!
//! # fn example() -> white_bg::Result<()> {
//! let config = PipelineConfig::builder()
//!     .resize_max(Some(1024))
//!     .output_mode(OutputMode::WhiteBackground)
//!     .build()?;
//!
//! let mut generator = WhiteBgGenerator::new(config)?;
//! let result = generator.process_image("product.jpg", Some(Path::new("product_white.jpg")), None)?;
//! println!("segmented with {}", result.segmentation);
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime model backend
//! - `cli` (default): command-line interface, progress bars and subscriber set-up
//! - `webp-support` (default): WebP input and output
//! - `tracing-json`: JSON log output for the CLI
//!
//! Without `onnx` every image goes through GrabCut:
//!
//! ```toml
//! [dependencies]
//! white-bg = { version = "0.1", default-features = false }
//! ```

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod services;
pub mod tracing_config;
pub mod types;
pub mod utils;

use std::path::{Path, PathBuf};
use tracing::Instrument;

// Public API exports
pub use backends::GrabCutBackend;
#[cfg(feature = "onnx")]
pub use backends::OnnxBackend;
pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use compositor::{composite_on_white, with_full_opacity};
pub use config::{
    ExecutionProvider, OutputMode, PipelineConfig, PipelineConfigBuilder,
    SegmentationCapabilities,
};
pub use download::ModelDownloader;
pub use error::{Result, WhiteBgError};
pub use inference::{SegmentationBackend, SegmentationProvider};
pub use models::{ModelInfo, ModelName};
pub use processor::WhiteBgGenerator;
pub use services::{
    ConsoleProgressReporter, ImageIOService, NoOpProgressReporter, OutputFormatHandler,
    ProcessingStage, ProgressReporter, ProgressUpdate,
};
#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;
pub use tracing_config::{events, spans, TracingConfig, TracingFormat};
pub use types::{
    BatchItemFailure, BatchReport, ImageSource, ProcessingResult, ProcessingTimings,
    SegmentationMask, SegmentationOutcome,
};
pub use utils::Resizer;

/// Make sure a model file is present in the model directory
///
/// Downloads the model when it is missing. A cached file that does not match
/// its checksum sidecar is removed and downloaded again. Returns the path of
/// the cached file.
///
/// # Examples
/// ```rust,no_run
/// use white_bg::{ensure_model_available, ModelName};
///
/// # async fn example() -> white_bg::Result<()> {
/// let path = ensure_model_available(ModelName::U2netp, None, true).await?;
/// println!("model at {}", path.display());
/// # Ok(())
/// # }
/// ```
pub async fn ensure_model_available(
    model: ModelName,
    model_dir: Option<&Path>,
    show_progress: bool,
) -> Result<PathBuf> {
    let cache = ModelCache::new(model_dir)?;
    if cache.is_model_cached(model) {
        if cache.verify(model)? {
            return Ok(cache.model_path(model));
        }
        log::warn!("Cached model {model} failed verification, downloading it again");
        cache.clear_model(model)?;
    }

    let span = spans::download(&model.download_url(), cache.cache_dir());
    ModelDownloader::new(cache)?
        .download_model(model, show_progress)
        .instrument(span)
        .await
}

/// Composite the foreground of encoded image bytes over white
///
/// Builds a one-off generator, so prefer [`WhiteBgGenerator`] for more than
/// a single image.
///
/// # Examples
/// ```rust,no_run
/// use white_bg::{white_background_from_bytes, PipelineConfig};
///
/// # fn example(upload: Vec<u8>) -> white_bg::Result<()> {
/// let image = white_background_from_bytes(&upload, &PipelineConfig::default())?;
/// image.save("white.png")?;
/// # Ok(())
/// # }
/// ```
pub fn white_background_from_bytes(
    image_bytes: &[u8],
    config: &PipelineConfig,
) -> Result<image::DynamicImage> {
    let image = ImageIOService::load_from_bytes(image_bytes)?;
    let mut generator = WhiteBgGenerator::new(config.clone())?;
    let result = generator.process_image(image, None, None)?;
    Ok(result.image)
}
