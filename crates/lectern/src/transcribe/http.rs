//! HTTP transcription client.
//!
//! Posts the raw audio bytes to a speech-to-text endpoint and converts
//! the word-level response into a `Transcription`. The blocking client is
//! deliberate: transcription runs on pool worker threads, not on an
//! async runtime.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::{
    LowConfidenceWord, Transcriber, TranscribeError, Transcription, LOW_CONFIDENCE_THRESHOLD,
};

/// Wire format returned by the transcription endpoint.
#[derive(Debug, Deserialize)]
struct EngineResponse {
    text: String,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    words: Vec<EngineWord>,
}

#[derive(Debug, Deserialize)]
struct EngineWord {
    word: String,
    confidence: f64,
    #[serde(default)]
    start: f64,
}

pub struct HttpTranscriber {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpTranscriber {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, TranscribeError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|e| TranscribeError::Engine(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl Transcriber for HttpTranscriber {
    fn transcribe(&self, audio_path: &Path) -> Result<Transcription, TranscribeError> {
        if !audio_path.exists() {
            return Err(TranscribeError::MissingFile(audio_path.to_path_buf()));
        }
        let bytes = std::fs::read(audio_path).map_err(|e| TranscribeError::ReadAudio {
            path: audio_path.to_path_buf(),
            source: e,
        })?;

        log::debug!(
            "Transcribing {} ({} bytes) via {}",
            audio_path.display(),
            bytes.len(),
            self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .map_err(|e| TranscribeError::Engine(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TranscribeError::Engine(format!(
                "Engine returned HTTP {}",
                response.status()
            )));
        }

        let parsed: EngineResponse = response
            .json()
            .map_err(|e| TranscribeError::Engine(format!("Malformed engine response: {}", e)))?;

        Ok(convert(parsed))
    }
}

fn convert(response: EngineResponse) -> Transcription {
    let low_confidence_words = response
        .words
        .into_iter()
        .filter(|w| w.confidence < LOW_CONFIDENCE_THRESHOLD)
        .map(|w| LowConfidenceWord {
            word: w.word,
            confidence: w.confidence,
            start_seconds: w.start,
        })
        .collect();

    Transcription {
        text: response.text,
        duration_seconds: response.duration,
        language: response.language.unwrap_or_else(|| "en".to_string()),
        low_confidence_words,
    }
}
