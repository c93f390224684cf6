//! ONNX Runtime segmentation backend
//!
//! Loads one of the registered salient-object models into an ONNX Runtime
//! session and turns its probability map into an RGBA cutout. Execution
//! providers (CPU, CUDA, CoreML) are chosen from the pipeline configuration
//! and checked for availability before use.

use crate::config::ExecutionProvider;
use crate::error::{Result, WhiteBgError};
use crate::inference::SegmentationBackend;
use crate::models::{ModelName, PreprocessingConfig};
use crate::types::SegmentationOutcome;
use crate::utils::{ImagePreprocessor, MaskPostprocessor};
use image::{DynamicImage, GenericImageView};
use instant::Instant;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::{self, value::Value};
use std::path::Path;

/// ONNX Runtime backend running a salient-object segmentation model
#[derive(Debug)]
pub struct OnnxBackend {
    session: Session,
    model: ModelName,
    preprocessing: PreprocessingConfig,
}

impl OnnxBackend {
    /// List all ONNX Runtime execution providers with availability status and descriptions
    ///
    /// # Examples
    /// ```rust,no_run
    /// use white_bg::backends::OnnxBackend;
    ///
    /// for (name, available, description) in OnnxBackend::list_providers() {
    ///     println!("{}: {} - {}", name, if available { "✅" } else { "❌" }, description);
    /// }
    /// ```
    pub fn list_providers() -> Vec<(String, bool, String)> {
        log::debug!("🔍 System: {} / {}", std::env::consts::OS, std::env::consts::ARCH);

        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    /// Execution providers to register for a requested provider
    ///
    /// Unavailable accelerators are skipped, which leaves ONNX Runtime on CPU.
    fn execution_providers(provider: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let cuda = || {
            let cuda_provider = CUDAExecutionProvider::default();
            if OrtExecutionProvider::is_available(&cuda_provider).unwrap_or(false) {
                log::info!("🚀 CUDA execution provider is available and will be used");
                Some(cuda_provider.build())
            } else {
                log::debug!("CUDA execution provider is not available");
                None
            }
        };
        let coreml = || {
            let coreml_provider = CoreMLExecutionProvider::default();
            if OrtExecutionProvider::is_available(&coreml_provider).unwrap_or(false) {
                log::info!("🍎 CoreML execution provider is available and will be used");
                Some(CoreMLExecutionProvider::default().with_subgraphs(true).build())
            } else {
                log::debug!("CoreML execution provider is not available");
                None
            }
        };

        let providers: Vec<ExecutionProviderDispatch> = match provider {
            ExecutionProvider::Auto => [cuda(), coreml()].into_iter().flatten().collect(),
            ExecutionProvider::Cuda => cuda().into_iter().collect(),
            ExecutionProvider::CoreMl => coreml().into_iter().collect(),
            ExecutionProvider::Cpu => Vec::new(),
        };

        if providers.is_empty() && provider != ExecutionProvider::Cpu {
            log::warn!("⚠️ No hardware acceleration available for {provider}, falling back to CPU");
        }
        providers
    }

    /// Load a model file into a new session
    ///
    /// # Errors
    /// - `WhiteBgError::ModelUnavailable` when the file is missing or the
    ///   session cannot be created from it
    pub fn load<P: AsRef<Path>>(
        model: ModelName,
        model_path: P,
        provider: ExecutionProvider,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let load_start = Instant::now();

        if !model_path.is_file() {
            return Err(WhiteBgError::model_unavailable(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }

        let mut session_builder = Session::builder()
            .map_err(|e| {
                WhiteBgError::model_unavailable(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                WhiteBgError::model_unavailable(format!("Failed to set optimization level: {e}"))
            })?;

        let providers = Self::execution_providers(provider);
        if !providers.is_empty() {
            session_builder = session_builder
                .with_execution_providers(providers)
                .map_err(|e| {
                    WhiteBgError::model_unavailable(format!(
                        "Failed to set execution providers: {e}"
                    ))
                })?;
        }

        let session = session_builder.commit_from_file(model_path).map_err(|e| {
            WhiteBgError::model_unavailable(format!(
                "Failed to create session from {}: {e}",
                model_path.display()
            ))
        })?;

        log::info!(
            "📊 Model {} loaded in {:.0}ms ({provider})",
            model,
            load_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Self {
            session,
            model,
            preprocessing: model.preprocessing(),
        })
    }

    /// Model served by this session
    #[must_use]
    pub fn model(&self) -> ModelName {
        self.model
    }
}

impl SegmentationBackend for OnnxBackend {
    fn segment(&mut self, image: &DynamicImage) -> Result<DynamicImage> {
        let inference_start = Instant::now();
        let input = ImagePreprocessor::preprocess_for_inference(image, &self.preprocessing)?;
        log::debug!("🚀 Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input)
            .map_err(|e| WhiteBgError::inference(format!("Failed to convert input tensor: {e}")))?;

        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(|e| WhiteBgError::inference(format!("ONNX inference failed: {e}")))?;

        // Positional access: the first output is the finest prediction
        let keys: Vec<_> = outputs.keys().collect();
        let first_key = keys
            .first()
            .ok_or_else(|| WhiteBgError::inference("No output tensors found"))?;
        let output_tensor = outputs
            .get(first_key)
            .ok_or_else(|| WhiteBgError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| WhiteBgError::inference(format!("Failed to extract output tensor: {e}")))?;

        let mask = MaskPostprocessor::tensor_to_mask(&output_tensor, image.dimensions())?;
        let cutout = mask.cutout(image)?;

        log::info!(
            "📊 Inference complete: {:.2}ms total",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(DynamicImage::ImageRgba8(cutout))
    }

    fn kind(&self) -> SegmentationOutcome {
        SegmentationOutcome::Model
    }

    fn is_model_loaded(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}
