//! Services around the core pipeline: decoding, export and progress

pub mod export;
pub mod format;
pub mod io;
pub mod progress;

pub use export::{ExportedFiles, Exporter};
pub use format::ContentType;
pub use io::{ImageIOService, LoadedImage};
pub use progress::{
    ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage, ProgressReporter,
    ProgressTracker, ProgressUpdate,
};
