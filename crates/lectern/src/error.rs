//! Crate-level error rollup.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LecternError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),
    #[error("Export error: {0}")]
    Export(#[from] crate::export::ExportError),
    #[error("Task error: {0}")]
    Task(#[from] crate::task::TaskError),
    #[error("Transcriber error: {0}")]
    Transcribe(#[from] crate::transcribe::TranscribeError),
    #[error("Generator error: {0}")]
    Generate(#[from] crate::generate::GenerateError),
}

pub type Result<T> = std::result::Result<T, LecternError>;
