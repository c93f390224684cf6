//! White background CLI tool
//!
//! Command-line interface for replacing image backgrounds with white using the
//! white-bg generator.

use super::config::CliConfigBuilder;
use crate::{
    cache::format_size,
    config::{OutputMode, PipelineConfig},
    ensure_model_available,
    error::WhiteBgError,
    models::ModelName,
    processor::WhiteBgGenerator,
    services::{
        ConsoleProgressReporter, ImageIOService, IndicatifProgressReporter, OutputFormatHandler,
        ProgressReporter,
    },
    tracing_config::{events, init_cli_tracing, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use image::{DynamicImage, Rgb, RgbImage};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default directory for batch output
const DEFAULT_OUTPUT_DIR: &str = "output";

/// Replace image backgrounds with solid white
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "white-bg", args_conflicts_with_subcommands = true)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Input image file or directory of images
    #[arg(value_name = "INPUT")]
    pub input: Option<PathBuf>,

    /// Output file (single input) or directory (batch) [default: next to input / output/]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Segmentation model
    #[arg(short, long, value_enum, default_value_t = CliModel::U2net)]
    pub model: CliModel,

    /// Downscale so the longer side is at most SIZE pixels
    #[arg(long, value_name = "SIZE", value_parser = clap::value_parser!(u32).range(1..))]
    pub resize: Option<u32>,

    /// File-name prefix for batch outputs
    #[arg(long, default_value = crate::config::DEFAULT_BATCH_PREFIX)]
    pub prefix: String,

    /// Process directory recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Only process files whose name matches this glob (e.g. "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,

    /// JPEG quality (1-100)
    #[arg(
        long,
        default_value_t = crate::config::DEFAULT_JPEG_QUALITY,
        value_parser = clap::value_parser!(u8).range(1..=100)
    )]
    pub quality: u8,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Show ONNX Runtime execution providers and exit
    #[arg(long)]
    pub show_providers: bool,

    /// Disable hardware acceleration
    #[arg(long)]
    pub no_gpu: bool,

    /// Output mode
    #[arg(long, value_enum, default_value_t = CliOutputMode::WhiteBg)]
    pub output_format: CliOutputMode,

    /// Never download model files
    #[arg(long)]
    pub offline: bool,

    /// Model directory [default: $U2NET_HOME or ~/.u2net]
    #[arg(long, value_name = "PATH")]
    pub model_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// List the available segmentation models
    Models,
    /// Run a synthetic image through the pipeline
    Test {
        /// Segmentation model
        #[arg(short, long, value_enum, default_value_t = CliModel::U2net)]
        model: CliModel,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliModel {
    U2net,
    U2netp,
    #[value(name = "u2net_human_seg")]
    U2netHumanSeg,
    Silueta,
    IsnetGeneralUse,
}

impl From<CliModel> for ModelName {
    fn from(model: CliModel) -> Self {
        match model {
            CliModel::U2net => ModelName::U2net,
            CliModel::U2netp => ModelName::U2netp,
            CliModel::U2netHumanSeg => ModelName::U2netHumanSeg,
            CliModel::Silueta => ModelName::Silueta,
            CliModel::IsnetGeneralUse => ModelName::IsnetGeneralUse,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliOutputMode {
    WhiteBg,
    TransparentPng,
}

impl From<CliOutputMode> for OutputMode {
    fn from(mode: CliOutputMode) -> Self {
        match mode {
            CliOutputMode::WhiteBg => OutputMode::WhiteBackground,
            CliOutputMode::TransparentPng => OutputMode::TransparentPng,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    /// Colored human-readable output
    Console,
    /// Plain output for CI logs
    Compact,
    /// JSON lines (requires the tracing-json feature)
    Json,
}

impl TryFrom<CliLogFormat> for TracingFormat {
    type Error = anyhow::Error;

    fn try_from(format: CliLogFormat) -> Result<Self> {
        match format {
            CliLogFormat::Console => Ok(TracingFormat::Console),
            CliLogFormat::Compact => Ok(TracingFormat::Compact),
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => Ok(TracingFormat::Json),
            #[cfg(not(feature = "tracing-json"))]
            CliLogFormat::Json => {
                anyhow::bail!("JSON logging is not compiled in; rebuild with --features tracing-json")
            },
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_format = TracingFormat::try_from(cli.log_format)?;
    init_cli_tracing(cli.verbose, log_format).context("Failed to initialize tracing")?;
    let start_time = Instant::now();

    if cli.show_providers {
        show_providers();
        return Ok(());
    }

    match cli.command {
        Some(Command::Models) => {
            list_models();
            return Ok(());
        },
        Some(Command::Test { model }) => return run_self_test(&cli, model.into()),
        None => {},
    }

    let input = cli
        .input
        .clone()
        .context("An INPUT file or directory is required")?;

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    CliConfigBuilder::validate_input(&input).context("Invalid input")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    info!("Input: {}", input.display());
    debug!(
        model = %config.model,
        gpu = config.enable_gpu,
        mode = %config.output_mode,
        "Configuration ready"
    );

    prepare_model(&cli, &config).await;

    let token = CancellationToken::new();
    spawn_cancellation_listener(token.clone());

    let generator = WhiteBgGenerator::new(config)
        .context("Failed to create white background generator")?
        .with_cancellation(token);

    let outcome = if input.is_dir() {
        process_directory(&cli, generator, &input)
    } else {
        process_single_file(&cli, generator, &input)
    };

    match outcome {
        Ok(RunOutcome::Finished) => {},
        Ok(RunOutcome::Cancelled) => println!("Processing cancelled by user"),
        Err(e) if is_cancellation(&e) => println!("Processing cancelled by user"),
        Err(e) => return Err(e),
    }

    println!("⏱️  Total time: {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

/// How a processing run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    Finished,
    Cancelled,
}

fn is_cancellation(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<WhiteBgError>()
        .is_some_and(WhiteBgError::is_cancelled)
}

/// Fire `token` on Ctrl-C
///
/// The listener runs on a runtime worker while processing blocks the main task.
fn spawn_cancellation_listener(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current stage");
            token.cancel();
        }
    });
}

/// Download the model unless offline; failures only downgrade to the fallback
async fn prepare_model(cli: &Cli, config: &PipelineConfig) {
    if cli.offline || !config.capabilities.model_runtime {
        debug!("Skipping model download");
        return;
    }

    if let Err(e) = ensure_model_available(config.model, config.model_dir.as_deref(), true).await {
        events::warning_with_recommendation(
            &format!("Could not download model '{}': {e}", config.model),
            "GrabCut segmentation will be used instead",
        );
    }
}

fn process_single_file(
    cli: &Cli,
    mut generator: WhiteBgGenerator,
    input_path: &Path,
) -> Result<RunOutcome> {
    ImageIOService::validate_image_path(input_path).context("Invalid input file")?;

    let mode = generator.config().output_mode;
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| OutputFormatHandler::default_output_path(input_path, mode));

    let result = generator
        .process_image(input_path, Some(&output_path), None)
        .with_context(|| format!("Failed to process {}", input_path.display()))?;

    let timings = &result.timings;
    info!("📊 Processing breakdown for {}:", input_path.display());
    info!("  ├─ Load: {}ms", timings.load_ms);
    info!("  ├─ Resize: {}ms", timings.resize_ms);
    info!("  ├─ Segmentation ({}): {}ms", result.segmentation, timings.segmentation_ms);
    info!("  ├─ Composite: {}ms", timings.composite_ms);
    info!("  ├─ Save: {}ms", timings.save_ms);
    info!("  └─ Total: {}ms", timings.total_ms);

    if let Some(saved) = &result.saved_to {
        let size = std::fs::metadata(saved).map(|meta| meta.len()).unwrap_or(0);
        println!("✅ Saved {} ({})", saved.display(), format_size(size));
    }

    Ok(RunOutcome::Finished)
}

fn process_directory(
    cli: &Cli,
    generator: WhiteBgGenerator,
    input_dir: &Path,
) -> Result<RunOutcome> {
    let files = find_image_files(input_dir, cli.recursive, cli.pattern.as_deref())?;
    if files.is_empty() {
        println!("No supported images found in {}", input_dir.display());
        return Ok(RunOutcome::Finished);
    }

    let output_dir = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    events::progress(
        &format!(
            "Found {} image(s), writing to {}",
            files.len(),
            output_dir.display()
        ),
        "📁",
    );

    let reporter = batch_reporter(
        files.len(),
        std::io::stderr().is_terminal(),
        cli.verbose > 0,
    );
    let mut generator = generator.with_progress_reporter(reporter);
    let report = generator
        .process_batch(&files, &output_dir)
        .with_context(|| format!("Failed to process directory {}", input_dir.display()))?;

    for failure in &report.failures {
        warn!("Failed: {} ({})", failure.input.display(), failure.error);
    }

    if report.cancelled {
        Ok(RunOutcome::Cancelled)
    } else {
        Ok(RunOutcome::Finished)
    }
}

/// Progress bar on a terminal, log lines otherwise
fn batch_reporter(total: usize, interactive: bool, verbose: bool) -> Box<dyn ProgressReporter> {
    if interactive {
        Box::new(IndicatifProgressReporter::new(total))
    } else {
        Box::new(ConsoleProgressReporter::new(verbose))
    }
}

/// Find supported images in a directory, sorted by path
fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if recursive {
        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry?;
            if entry.file_type().is_file() {
                let path = entry.path();
                if ImageIOService::is_supported_format(path) && matches_pattern(path, pattern) {
                    files.push(path.to_path_buf());
                }
            }
        }
    } else {
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let path = entry.path();
                if ImageIOService::is_supported_format(&path) && matches_pattern(&path, pattern) {
                    files.push(path);
                }
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Check if file name matches the given glob pattern
fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => {
            if let Some(filename) = path.file_name().and_then(|n| n.to_str()) {
                glob::Pattern::new(pat)
                    .map(|p| p.matches(filename))
                    .unwrap_or(false)
            } else {
                false
            }
        },
        None => true,
    }
}

fn show_providers() {
    println!("🔧 Execution providers");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    #[cfg(feature = "onnx")]
    for (name, available, description) in crate::backends::OnnxBackend::list_providers() {
        let status = if available { "✅" } else { "❌" };
        println!("  {status} {name:<8} {description}");
    }

    #[cfg(not(feature = "onnx"))]
    println!("  ONNX Runtime is not compiled in; GrabCut segmentation only");

    println!("\n💡 Use --no-gpu to force CPU inference");
}

fn list_models() {
    println!("📦 Available models");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for model in ModelName::ALL {
        println!("  • {:<18} {}", model.as_str(), model.description());
    }
    println!("\n💡 Usage: white-bg --model MODEL input.jpg");
}

/// 300x300 red square with a blue disc in the middle
fn self_test_image() -> DynamicImage {
    let image = RgbImage::from_fn(300, 300, |x, y| {
        let dx = f64::from(x) - 150.0;
        let dy = f64::from(y) - 150.0;
        if dx * dx + dy * dy <= 100.0 * 100.0 {
            Rgb([0, 0, 255])
        } else {
            Rgb([255, 0, 0])
        }
    });
    DynamicImage::ImageRgb8(image)
}

fn run_self_test(cli: &Cli, model: ModelName) -> Result<()> {
    let config = PipelineConfig::builder()
        .model(model)
        .enable_gpu(!cli.no_gpu)
        .model_dir(cli.model_dir.clone())
        .build()
        .context("Invalid configuration")?;

    let mut generator =
        WhiteBgGenerator::new(config).context("Failed to create white background generator")?;

    let info = generator.model_info();
    println!("🔍 Model info");
    println!("  • Model: {}", info.model_name);
    println!("  • Runtime available: {}", info.model_runtime_available);
    println!("  • Session loaded: {}", info.session_loaded);
    println!("  • GPU enabled: {}", info.gpu_enabled);
    println!("  • Backend: {}", generator.backend_name());

    match generator.process_image(self_test_image(), None, None) {
        Ok(result) => {
            println!(
                "✅ Self test passed: {}x{} image segmented via {} in {}ms",
                result.image.width(),
                result.image.height(),
                result.segmentation,
                result.timings.total_ms
            );
            Ok(())
        },
        Err(e) => {
            println!("❌ Self test failed: {e}");
            Err(e).context("Self test failed")
        },
    }
}
