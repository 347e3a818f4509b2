//! Lecture processing: audio in, transcript and slide deck out.

pub mod error;
pub mod progress;
pub mod runner;

pub use error::{ErrorKind, PipelineError};
pub use progress::{
    NoopProgress, ProgressBroadcaster, ProgressReporter, Stage, StageEvent, TaskProgress,
};
pub use runner::{ProcessingPipeline, ProcessingReport};
