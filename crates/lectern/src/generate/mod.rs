//! Slide deck generation from a transcript.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod http;

pub use http::HttpSlideGenerator;

/// Transcripts shorter than this cannot yield a meaningful deck and are
/// rejected before any backend call.
pub const MIN_TRANSCRIPT_CHARS: usize = 50;

/// Default cap on deck length.
pub const DEFAULT_MAX_SLIDES: usize = 20;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Transcript too short to generate slides ({0} chars)")]
    TranscriptTooShort(usize),
    #[error("Slide generation backend error: {0}")]
    Backend(String),
    #[error("Backend returned malformed slide data: {0}")]
    MalformedOutput(String),
    #[error("Backend returned an empty slide deck")]
    EmptyDeck,
}

impl GenerateError {
    /// Errors caused by the caller's input rather than the backend.
    pub fn is_input(&self) -> bool {
        matches!(self, GenerateError::TranscriptTooShort(_))
    }
}

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub max_slides: usize,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_slides: DEFAULT_MAX_SLIDES,
        }
    }
}

/// One slide as produced by the generator, before persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlideDraft {
    pub title: String,
    pub content: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub slides: Vec<SlideDraft>,
    /// Backend-specific metadata (model name, token counts).
    pub metadata: Value,
}

pub trait SlideGenerator: Send + Sync {
    fn generate(
        &self,
        transcript: &str,
        options: &GenerateOptions,
    ) -> Result<GenerationResult, GenerateError>;
}
