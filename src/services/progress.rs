//! Progress reporting service
//!
//! This module separates progress reporting concerns from business logic,
//! allowing different frontends to implement their own progress handling.

use crate::types::ProcessingTimings;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use instant::Instant;
use std::path::Path;

/// Progress stages of the white-background pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Loading and decoding the input
    ImageLoading,
    /// Bounded downscale
    Resizing,
    /// Foreground segmentation
    Segmentation,
    /// Compositing over white
    Compositing,
    /// Encoding and writing the output
    FileSaving,
    /// Processing completed
    Completed,
    /// Processing one item of a batch
    BatchItemProcessing,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::ImageLoading => "Loading input image",
            ProcessingStage::Resizing => "Resizing image",
            ProcessingStage::Segmentation => "Segmenting foreground",
            ProcessingStage::Compositing => "Compositing over white",
            ProcessingStage::FileSaving => "Saving result",
            ProcessingStage::Completed => "Processing completed",
            ProcessingStage::BatchItemProcessing => "Processing batch item",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::ImageLoading => 10,
            ProcessingStage::Resizing => 20,
            ProcessingStage::Segmentation => 70,
            ProcessingStage::Compositing => 85,
            ProcessingStage::FileSaving => 95,
            ProcessingStage::Completed => 100,
            ProcessingStage::BatchItemProcessing => 50,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create a new progress update
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }
}

/// Progress of a batch after one item finished
#[derive(Debug, Clone)]
pub struct BatchProgressUpdate {
    /// Items finished so far (succeeded or failed)
    pub items_completed: usize,
    /// Total number of items
    pub items_total: usize,
    /// Items that failed so far
    pub items_failed: usize,
    /// Name of the item that just finished
    pub current_item_name: String,
}

/// Trait for reporting progress during white-background operations
pub trait ProgressReporter: Send + Sync {
    /// Report a stage transition
    fn report_progress(&self, update: ProgressUpdate);

    /// Report processing completion with final timings
    fn report_completion(&self, timings: &ProcessingTimings);

    /// Report an error during processing
    fn report_error(&self, stage: ProcessingStage, error: &str);

    /// Report that a batch item finished
    fn report_batch_progress(&self, _update: BatchProgressUpdate) {}

    /// Report that the batch finished
    fn finish_batch(&self, _summary: &str) {}
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: &ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Console progress reporter that logs progress through `log`
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::debug!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, timings: &ProcessingTimings) {
        log::info!("✅ White background generated in {}ms", timings.total_ms);

        if self.verbose {
            log::info!("  📊 Detailed timings:");
            log::info!("    • Load: {}ms", timings.load_ms);
            log::info!("    • Resize: {}ms", timings.resize_ms);
            log::info!("    • Segmentation: {}ms", timings.segmentation_ms);
            log::info!("    • Composite: {}ms", timings.composite_ms);
            log::info!("    • Save: {}ms", timings.save_ms);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("❌ Error during {}: {}", stage.description(), error);
    }

    fn report_batch_progress(&self, update: BatchProgressUpdate) {
        log::info!(
            "[{}/{}] {} ({} failed)",
            update.items_completed,
            update.items_total,
            update.current_item_name,
            update.items_failed
        );
    }

    fn finish_batch(&self, summary: &str) {
        log::info!("Completed: {summary}");
    }
}

/// Batch progress bar for terminal use
#[cfg(feature = "cli")]
pub struct IndicatifProgressReporter {
    bar: ProgressBar,
}

#[cfg(feature = "cli")]
impl IndicatifProgressReporter {
    /// Create a progress bar sized for `total` batch items
    #[must_use]
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        Self { bar }
    }
}

#[cfg(feature = "cli")]
impl ProgressReporter for IndicatifProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.bar.set_message(update.description);
    }

    fn report_completion(&self, _timings: &ProcessingTimings) {}

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        self.bar
            .println(format!("❌ Error during {}: {}", stage.description(), error));
    }

    fn report_batch_progress(&self, update: BatchProgressUpdate) {
        self.bar.set_position(update.items_completed as u64);
        self.bar.set_message(update.current_item_name);
    }

    fn finish_batch(&self, summary: &str) {
        self.bar.finish_with_message(format!("Completed: {summary}"));
    }
}

/// Display name of a batch item for progress messages
#[must_use]
pub fn item_display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().to_string())
}
