//! White-background pipeline orchestrator
//!
//! `WhiteBgGenerator` owns the segmentation backend chosen at construction and
//! runs every image through the same stages: load, bounded resize, segment,
//! composite over white (or keep the alpha channel), save. Both the CLI and
//! library callers go through it so behaviour stays identical.

use crate::{
    backends::GrabCutBackend,
    compositor,
    config::PipelineConfig,
    error::{Result, WhiteBgError},
    inference::{SegmentationBackend, SegmentationProvider},
    models::{ModelInfo, ModelName},
    services::{
        item_display_name, BatchProgressUpdate, ImageIOService, NoOpProgressReporter,
        OutputFormatHandler, ProcessingStage, ProgressReporter, ProgressUpdate,
    },
    tracing_config::{events, spans},
    types::{BatchItemFailure, BatchReport, ImageSource, ProcessingResult, ProcessingTimings},
    utils::Resizer,
};
use image::{DynamicImage, GenericImageView};
use instant::Instant;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Span};

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Turns image backgrounds white
///
/// The backend is selected once in [`WhiteBgGenerator::new`]: the configured
/// model when the runtime is compiled in and the weights load, GrabCut
/// otherwise. It never changes for the lifetime of the generator.
///
/// # Examples
/// ```rust,no_run
/// use white_bg::{PipelineConfig, WhiteBgGenerator};
/// use std::path::Path;
///
/// let mut generator = WhiteBgGenerator::new(PipelineConfig::default())?;
/// let result = generator.process_image("photo.jpg", Some(Path::new("photo_white.jpg")), Some(1024))?;
/// println!("{} via {}", result.saved_to.unwrap().display(), result.segmentation);
/// # Ok::<(), white_bg::WhiteBgError>(())
/// ```
pub struct WhiteBgGenerator {
    config: PipelineConfig,
    provider: SegmentationProvider,
    span: Span,
    cancellation: Option<CancellationToken>,
    progress_reporter: Box<dyn ProgressReporter>,
}

impl WhiteBgGenerator {
    /// Create a generator, loading the model session once if possible
    ///
    /// A missing or unloadable model is not an error: it is logged as a
    /// warning and the GrabCut fallback is used instead.
    ///
    /// # Errors
    /// - `WhiteBgError::InvalidConfig` when the configuration does not validate
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let backend = Self::select_backend(&config);
        Self::with_backend(config, backend)
    }

    /// Create a generator around an explicit backend
    ///
    /// # Errors
    /// - `WhiteBgError::InvalidConfig` when the configuration does not validate
    pub fn with_backend(
        config: PipelineConfig,
        backend: Box<dyn SegmentationBackend>,
    ) -> Result<Self> {
        config.validate()?;
        let span = spans::generator(config.model.as_str(), backend.name());
        span.in_scope(|| {
            info!(
                model = %config.model,
                backend = backend.name(),
                mode = %config.output_mode,
                "White background generator ready"
            );
        });

        Ok(Self {
            config,
            provider: SegmentationProvider::new(backend),
            span,
            cancellation: None,
            progress_reporter: Box::new(NoOpProgressReporter),
        })
    }

    /// Stop between stages and between batch items once `token` fires
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Report stage transitions and batch progress to `reporter`
    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.progress_reporter = reporter;
        self
    }

    fn select_backend(config: &PipelineConfig) -> Box<dyn SegmentationBackend> {
        if !config.capabilities.model_runtime {
            info!("Model runtime not available in this build, using GrabCut segmentation");
            return Box::new(GrabCutBackend::new());
        }

        match Self::load_model_backend(config) {
            Ok(backend) => backend,
            Err(e) => {
                events::warning_with_recommendation(
                    &format!("Model '{}' could not be loaded: {e}", config.model),
                    "Falling back to GrabCut; download the model or set U2NET_HOME",
                );
                Box::new(GrabCutBackend::new())
            },
        }
    }

    #[cfg(feature = "onnx")]
    fn load_model_backend(config: &PipelineConfig) -> Result<Box<dyn SegmentationBackend>> {
        use crate::{backends::OnnxBackend, cache::ModelCache};

        let provider = config.execution_provider();
        let _span = spans::model_loading(config.model.as_str(), &provider.to_string()).entered();

        let cache = ModelCache::locate(config.model_dir.as_deref())?;
        if !cache.is_model_cached(config.model) {
            return Err(WhiteBgError::model_unavailable(format!(
                "Model '{}' is not cached in {}",
                config.model,
                cache.cache_dir().display()
            )));
        }

        let backend = OnnxBackend::load(config.model, cache.model_path(config.model), provider)?;
        Ok(Box::new(backend))
    }

    #[cfg(not(feature = "onnx"))]
    fn load_model_backend(_config: &PipelineConfig) -> Result<Box<dyn SegmentationBackend>> {
        Err(WhiteBgError::model_unavailable(
            "ONNX Runtime support is not compiled in",
        ))
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(WhiteBgError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn enter_stage(&self, stage: ProcessingStage, total_start: Instant) -> Result<()> {
        self.check_cancelled()?;
        self.progress_reporter
            .report_progress(ProgressUpdate::new(stage, total_start));
        Ok(())
    }

    /// Run one image through the full pipeline
    ///
    /// `resize_max` overrides `config.resize_max` for this call. When
    /// `output_path` is given the result is written there; transparent output
    /// rewrites a non-PNG extension to `.png`.
    ///
    /// Segmentation failures never surface: the original image is kept fully
    /// opaque and the outcome is reported as `Passthrough`.
    ///
    /// # Errors
    /// - `WhiteBgError::InvalidInput` for missing or unsupported input files
    /// - `WhiteBgError::InvalidConfig` for a zero resize target
    /// - `WhiteBgError::Image` / `WhiteBgError::Io` on decode or write failures
    /// - `WhiteBgError::Cancelled` when the cancellation token fired
    pub fn process_image(
        &mut self,
        source: impl Into<ImageSource>,
        output_path: Option<&Path>,
        resize_max: Option<u32>,
    ) -> Result<ProcessingResult> {
        let source = source.into();
        let span = self.span.clone();
        let _generator = span.enter();
        let _file = spans::file_processing(&source.describe(), &self.config.output_mode.to_string())
            .entered();

        let result = self.run_pipeline(&source, output_path, resize_max);
        if let Err(e) = &result {
            if !e.is_cancelled() {
                debug!(source = %source.describe(), error = %e, "Processing failed");
            }
        }
        result
    }

    fn run_pipeline(
        &mut self,
        source: &ImageSource,
        output_path: Option<&Path>,
        resize_max: Option<u32>,
    ) -> Result<ProcessingResult> {
        let max_side = resize_max.or(self.config.resize_max);
        if max_side == Some(0) {
            return Err(WhiteBgError::config_value_error(
                "resize target",
                0,
                "1 or more pixels",
                None,
            ));
        }

        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();

        self.enter_stage(ProcessingStage::ImageLoading, total_start)?;
        let stage_start = Instant::now();
        let image = ImageIOService::load_source(source).inspect_err(|e| {
            self.progress_reporter
                .report_error(ProcessingStage::ImageLoading, &e.to_string());
        })?;
        timings.load_ms = elapsed_ms(stage_start);
        let original_dimensions = image.dimensions();
        debug!(
            width = original_dimensions.0,
            height = original_dimensions.1,
            "Image loaded"
        );

        let image = match max_side {
            Some(max_side) => {
                self.enter_stage(ProcessingStage::Resizing, total_start)?;
                let stage_start = Instant::now();
                let resized = Resizer::resize_to_max(image, max_side);
                timings.resize_ms = elapsed_ms(stage_start);
                resized
            },
            None => image,
        };

        self.enter_stage(ProcessingStage::Segmentation, total_start)?;
        let stage_start = Instant::now();
        let (segmented, outcome) = {
            let _span =
                spans::segmentation(self.provider.backend().name(), image.dimensions()).entered();
            self.provider.segment(&image)
        };
        timings.segmentation_ms = elapsed_ms(stage_start);
        events::performance_metric("segmentation", timings.segmentation_ms);

        let output = if self.config.output_mode.keeps_alpha() {
            segmented
        } else {
            self.enter_stage(ProcessingStage::Compositing, total_start)?;
            let stage_start = Instant::now();
            let composited = compositor::composite_on_white(&segmented);
            timings.composite_ms = elapsed_ms(stage_start);
            composited
        };

        let saved_to = match output_path {
            Some(path) => {
                self.enter_stage(ProcessingStage::FileSaving, total_start)?;
                let stage_start = Instant::now();
                let resolved = OutputFormatHandler::resolve_output_path(path, self.config.output_mode);
                ImageIOService::save_image(&output, &resolved, self.config.jpeg_quality).inspect_err(
                    |e| {
                        self.progress_reporter
                            .report_error(ProcessingStage::FileSaving, &e.to_string());
                    },
                )?;
                timings.save_ms = elapsed_ms(stage_start);
                info!(output = %resolved.display(), "Saved result");
                Some(resolved)
            },
            None => None,
        };

        timings.total_ms = elapsed_ms(total_start);
        self.progress_reporter
            .report_progress(ProgressUpdate::new(ProcessingStage::Completed, total_start));
        self.progress_reporter.report_completion(&timings);
        events::performance_metric("total", timings.total_ms);

        Ok(ProcessingResult {
            image: output,
            saved_to,
            segmentation: outcome,
            original_dimensions,
            timings,
        })
    }

    /// Load an image and segment it, returning the RGBA cutout
    ///
    /// # Errors
    /// - Loading errors as in [`WhiteBgGenerator::process_image`]
    pub fn remove_background(&mut self, source: impl Into<ImageSource>) -> Result<DynamicImage> {
        let source = source.into();
        let _generator = self.span.clone().entered();
        self.check_cancelled()?;

        let image = ImageIOService::load_source(&source)?;
        let _span = spans::segmentation(self.provider.backend().name(), image.dimensions()).entered();
        let (cutout, outcome) = self.provider.segment(&image);
        debug!(outcome = %outcome, "Background removed");
        Ok(cutout)
    }

    /// Composite an image over white, dropping its alpha channel
    #[must_use]
    pub fn apply_white_background(&self, image: &DynamicImage) -> DynamicImage {
        compositor::composite_on_white(image)
    }

    /// Process files into `output_dir`, continuing past failed items
    ///
    /// Each output is named `{prefix}{file name}` (or `{prefix}{stem}.png` in
    /// transparent mode). Items run in input order; a fired cancellation token
    /// stops the run before the next item and marks the report cancelled.
    ///
    /// # Errors
    /// - `WhiteBgError::Io` when `output_dir` cannot be created
    pub fn process_batch(&mut self, inputs: &[PathBuf], output_dir: &Path) -> Result<BatchReport> {
        let span = self.span.clone();
        let _generator = span.enter();
        let _batch = spans::batch_processing(inputs.len()).entered();

        ImageIOService::ensure_output_directory(output_dir)?;
        info!(
            count = inputs.len(),
            output_dir = %output_dir.display(),
            "Starting batch"
        );

        let mut report = BatchReport {
            total: inputs.len(),
            ..BatchReport::default()
        };
        let batch_start = Instant::now();

        for input in inputs {
            if self.is_cancelled() {
                report.cancelled = true;
                break;
            }
            self.progress_reporter.report_progress(ProgressUpdate::new(
                ProcessingStage::BatchItemProcessing,
                batch_start,
            ));

            let prefix = self.config.prefix.clone();
            let outcome = OutputFormatHandler::batch_output_path(
                input,
                output_dir,
                &prefix,
                self.config.output_mode,
            )
            .and_then(|output| {
                self.process_image(input.as_path(), Some(&output), None)
                    .map(|result| result.saved_to.unwrap_or(output))
            });

            match outcome {
                Ok(saved) => report.outputs.push(saved),
                Err(e) if e.is_cancelled() => {
                    report.cancelled = true;
                    break;
                },
                Err(e) => {
                    events::error_with_context(&e, &format!("processing {}", input.display()));
                    report.failures.push(BatchItemFailure {
                        input: input.clone(),
                        error: e.to_string(),
                    });
                },
            }

            self.progress_reporter
                .report_batch_progress(BatchProgressUpdate {
                    items_completed: report.outputs.len() + report.failures.len(),
                    items_total: report.total,
                    items_failed: report.failures.len(),
                    current_item_name: item_display_name(input),
                });
        }

        if report.cancelled {
            warn!(summary = %report.summary(), "Batch cancelled");
        }
        info!(
            summary = %report.summary(),
            failed = report.failures.len(),
            "Batch complete"
        );
        self.progress_reporter.finish_batch(&report.summary());
        Ok(report)
    }

    /// Snapshot of the configured model and the loaded session
    #[must_use]
    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model_name: self.config.model.as_str().to_string(),
            model_runtime_available: self.config.capabilities.model_runtime,
            session_loaded: self.provider.backend().is_model_loaded(),
            gpu_enabled: self.config.enable_gpu,
            available_models: Self::available_models()
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    /// Names of all recognised models
    #[must_use]
    pub fn available_models() -> Vec<&'static str> {
        ModelName::names()
    }

    /// Name of the backend in use
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.provider.backend().name()
    }

    /// Get the current configuration
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{FailingBackend, FixedAlphaBackend};
    use crate::config::{OutputMode, SegmentationCapabilities};
    use crate::services::ConsoleProgressReporter;
    use crate::types::SegmentationOutcome;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn classical_config() -> PipelineConfig {
        PipelineConfig::builder()
            .capabilities(SegmentationCapabilities::classical_only())
            .build()
            .unwrap()
    }

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 30, 30])))
    }

    fn generator_with(backend: Box<dyn SegmentationBackend>) -> WhiteBgGenerator {
        WhiteBgGenerator::with_backend(classical_config(), backend).unwrap()
    }

    #[test]
    fn test_classical_only_selects_grabcut() {
        let generator = WhiteBgGenerator::new(classical_config()).unwrap();
        assert_eq!(generator.backend_name(), "grabcut");

        let info = generator.model_info();
        assert!(!info.session_loaded);
        assert!(!info.model_runtime_available);
        assert_eq!(info.available_models.len(), 5);
    }

    #[test]
    fn test_missing_model_falls_back_without_creating_model_dir() {
        let temp_dir = TempDir::new().unwrap();
        let model_dir = temp_dir.path().join("models");
        let config = PipelineConfig::builder()
            .capabilities(SegmentationCapabilities {
                model_runtime: true,
            })
            .model_dir(Some(model_dir.clone()))
            .build()
            .unwrap();

        let generator = WhiteBgGenerator::new(config).unwrap();
        assert_eq!(generator.backend_name(), "grabcut");
        assert!(!model_dir.exists());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = classical_config();
        config.jpeg_quality = 0;
        assert!(matches!(
            WhiteBgGenerator::new(config),
            Err(WhiteBgError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_transparent_alpha_becomes_white() {
        let mut generator = generator_with(Box::new(FixedAlphaBackend::new(0)));
        let result = generator
            .process_image(create_test_image(16, 12), None, None)
            .unwrap();

        assert_eq!(result.segmentation, SegmentationOutcome::Classical);
        assert_eq!(result.original_dimensions, (16, 12));
        assert!(result.saved_to.is_none());
        let rgb = result.image.to_rgb8();
        assert!(rgb.pixels().all(|p| p.0 == [255, 255, 255]));
    }

    #[test]
    fn test_opaque_alpha_keeps_colours() {
        let mut generator = generator_with(Box::new(FixedAlphaBackend::new(255)));
        let result = generator
            .process_image(create_test_image(8, 8), None, None)
            .unwrap();
        assert!(result.image.to_rgb8().pixels().all(|p| p.0 == [200, 30, 30]));
    }

    #[test]
    fn test_failing_backend_passes_original_through() {
        let backend = FailingBackend::new();
        let calls = backend.call_count();
        let mut generator = generator_with(Box::new(backend));

        let result = generator
            .process_image(create_test_image(10, 10), None, None)
            .unwrap();

        assert_eq!(result.segmentation, SegmentationOutcome::Passthrough);
        assert!(result.image.to_rgb8().pixels().all(|p| p.0 == [200, 30, 30]));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_resize_argument_overrides_config() {
        let config = PipelineConfig::builder()
            .capabilities(SegmentationCapabilities::classical_only())
            .resize_max(Some(50))
            .build()
            .unwrap();
        let mut generator =
            WhiteBgGenerator::with_backend(config, Box::new(FixedAlphaBackend::new(255))).unwrap();

        let from_config = generator
            .process_image(create_test_image(200, 100), None, None)
            .unwrap();
        assert_eq!(from_config.image.dimensions(), (50, 25));
        assert_eq!(from_config.original_dimensions, (200, 100));

        let from_argument = generator
            .process_image(create_test_image(200, 100), None, Some(20))
            .unwrap();
        assert_eq!(from_argument.image.dimensions(), (20, 10));
    }

    #[test]
    fn test_zero_resize_argument_rejected() {
        let mut generator = generator_with(Box::new(FixedAlphaBackend::new(255)));
        let result = generator.process_image(create_test_image(4, 4), None, Some(0));
        assert!(matches!(result, Err(WhiteBgError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_input_never_reaches_backend() {
        let backend = FixedAlphaBackend::new(255);
        let calls = backend.call_count();
        let mut generator = generator_with(Box::new(backend));

        let result = generator.process_image("/nonexistent/photo.jpg", None, None);
        assert!(matches!(result, Err(WhiteBgError::InvalidInput(_))));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_cancelled_token_stops_processing() {
        let token = CancellationToken::new();
        token.cancel();
        let mut generator =
            generator_with(Box::new(FixedAlphaBackend::new(255))).with_cancellation(token);

        let result = generator.process_image(create_test_image(4, 4), None, None);
        assert!(matches!(result, Err(WhiteBgError::Cancelled)));
    }

    #[test]
    fn test_saves_to_output_path() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("out.jpg");
        let mut generator = generator_with(Box::new(FixedAlphaBackend::new(255)));

        let result = generator
            .process_image(create_test_image(8, 8), Some(&output), None)
            .unwrap();

        assert_eq!(result.saved_to.as_deref(), Some(output.as_path()));
        assert!(output.is_file());
    }

    #[test]
    fn test_transparent_mode_keeps_alpha_and_writes_png() {
        let temp_dir = TempDir::new().unwrap();
        let config = PipelineConfig::builder()
            .capabilities(SegmentationCapabilities::classical_only())
            .output_mode(OutputMode::TransparentPng)
            .build()
            .unwrap();
        let mut generator =
            WhiteBgGenerator::with_backend(config, Box::new(FixedAlphaBackend::new(0))).unwrap();

        let result = generator
            .process_image(
                create_test_image(8, 8),
                Some(&temp_dir.path().join("cutout.jpg")),
                None,
            )
            .unwrap();

        let saved = result.saved_to.unwrap();
        assert_eq!(saved.extension().unwrap(), "png");
        assert!(saved.is_file());
        assert!(result.image.to_rgba8().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_remove_background_returns_cutout() {
        let mut generator = generator_with(Box::new(FixedAlphaBackend::new(128)));
        let cutout = generator.remove_background(create_test_image(5, 5)).unwrap();
        assert!(cutout.to_rgba8().pixels().all(|p| p.0 == [200, 30, 30, 128]));
    }

    #[test]
    fn test_apply_white_background() {
        let generator = generator_with(Box::new(FixedAlphaBackend::new(0)));
        let rgba = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            2,
            2,
            image::Rgba([0, 0, 0, 0]),
        ));
        let white = generator.apply_white_background(&rgba);
        assert!(white.to_rgb8().pixels().all(|p| p.0 == [255, 255, 255]));
    }

    #[test]
    fn test_batch_continues_after_failures() {
        let temp_dir = TempDir::new().unwrap();
        let input_dir = temp_dir.path().join("in");
        std::fs::create_dir(&input_dir).unwrap();

        let good = input_dir.join("good.png");
        create_test_image(6, 6).save(&good).unwrap();
        let missing = input_dir.join("missing.png");

        let output_dir = temp_dir.path().join("out");
        let mut generator = generator_with(Box::new(FixedAlphaBackend::new(255)))
            .with_progress_reporter(Box::new(ConsoleProgressReporter::new(true)));
        let report = generator
            .process_batch(&[missing.clone(), good], &output_dir)
            .unwrap();

        assert_eq!(report.summary(), "1/2");
        assert_eq!(report.outputs, vec![output_dir.join("white_bg_good.png")]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].input, missing);
        assert!(!report.cancelled);
    }

    #[test]
    fn test_batch_stops_when_cancelled() {
        let temp_dir = TempDir::new().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let mut generator =
            generator_with(Box::new(FixedAlphaBackend::new(255))).with_cancellation(token);

        let report = generator
            .process_batch(&[PathBuf::from("a.png"), PathBuf::from("b.png")], temp_dir.path())
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.succeeded(), 0);
        assert_eq!(report.skipped(), 2);
    }
}
