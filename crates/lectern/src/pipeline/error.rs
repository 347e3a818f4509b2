//! Pipeline error rollup and classification.

use thiserror::Error;

use crate::db::DatabaseError;
use crate::generate::GenerateError;
use crate::transcribe::TranscribeError;

/// Coarse classification of a pipeline failure, used for logging and for
/// deciding what (if anything) is retried. Only schema drift carries a
/// built-in retry, and that lives in the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input from the caller (missing audio, transcript too short).
    Input,
    /// An external collaborator failed (transcription engine, generator).
    Collaborator,
    /// The database schema drifted from what migrations define.
    SchemaDrift,
    /// Everything else; not safe to retry blindly.
    Fatal,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error(transparent)]
    Transcription(#[from] TranscribeError),
    #[error(transparent)]
    Generation(#[from] GenerateError),
    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::SessionNotFound(_) => ErrorKind::Input,
            PipelineError::Transcription(e) if e.is_input() => ErrorKind::Input,
            PipelineError::Transcription(_) => ErrorKind::Collaborator,
            PipelineError::Generation(e) if e.is_input() => ErrorKind::Input,
            PipelineError::Generation(_) => ErrorKind::Collaborator,
            PipelineError::Storage(e) if e.is_schema_drift() => ErrorKind::SchemaDrift,
            PipelineError::Storage(_) => ErrorKind::Fatal,
        }
    }
}
