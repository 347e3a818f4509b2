//! Speech-to-text abstraction.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod http;

pub use http::HttpTranscriber;

/// Words scoring below this are surfaced to the slide generator as
/// low-confidence so it can avoid leaning on possible mishearings.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.6;

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("Audio file not found: {0}")]
    MissingFile(PathBuf),
    #[error("Failed to read audio file {path}: {source}")]
    ReadAudio {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Transcription engine error: {0}")]
    Engine(String),
}

impl TranscribeError {
    /// Errors caused by the caller's input rather than the engine.
    pub fn is_input(&self) -> bool {
        matches!(self, TranscribeError::MissingFile(_))
    }
}

/// A word the engine was unsure about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowConfidenceWord {
    pub word: String,
    pub confidence: f64,
    pub start_seconds: f64,
}

/// Result of transcribing one audio file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    pub duration_seconds: f64,
    pub language: String,
    pub low_confidence_words: Vec<LowConfidenceWord>,
}

/// Converts recorded audio into text. Implementations are called from
/// worker threads, so they must be safely shareable.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio_path: &Path) -> Result<Transcription, TranscribeError>;
}
