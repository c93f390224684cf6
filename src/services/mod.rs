//! Service layer separating I/O, output naming and progress from the pipeline

pub mod format;
pub mod io;
pub mod progress;

pub use format::OutputFormatHandler;
pub use io::{ImageIOService, SUPPORTED_EXTENSIONS};
#[cfg(feature = "cli")]
pub use progress::IndicatifProgressReporter;
pub use progress::{
    item_display_name, BatchProgressUpdate, ConsoleProgressReporter, NoOpProgressReporter,
    ProcessingStage, ProgressReporter, ProgressUpdate,
};
