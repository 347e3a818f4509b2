//! LLM-backed slide generator.
//!
//! Sends the transcript to a chat-completion style endpoint and parses
//! the JSON deck out of the reply. The model is asked for strict JSON
//! but replies are defensively unwrapped from code fences anyway.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    GenerateError, GenerateOptions, GenerationResult, SlideDraft, SlideGenerator,
    MIN_TRANSCRIPT_CHARS,
};

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

pub struct HttpSlideGenerator {
    client: reqwest::blocking::Client,
    config: GeneratorConfig,
}

impl HttpSlideGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self, GenerateError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| GenerateError::Backend(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn request_completion(&self, prompt: &str) -> Result<ChatResponse, GenerateError> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.3,
        });

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .map_err(|e| GenerateError::Backend(e.to_string()))?;
        if !response.status().is_success() {
            return Err(GenerateError::Backend(format!(
                "Backend returned HTTP {}",
                response.status()
            )));
        }
        response
            .json()
            .map_err(|e| GenerateError::Backend(format!("Malformed backend response: {}", e)))
    }
}

const SYSTEM_PROMPT: &str = "You turn lecture transcripts into slide decks. \
Reply with JSON only: an object {\"slides\": [{\"title\": string, \
\"content\": [string, ...]}, ...]}. No prose, no markdown.";

impl SlideGenerator for HttpSlideGenerator {
    fn generate(
        &self,
        transcript: &str,
        options: &GenerateOptions,
    ) -> Result<GenerationResult, GenerateError> {
        let trimmed = transcript.trim();
        if trimmed.chars().count() < MIN_TRANSCRIPT_CHARS {
            return Err(GenerateError::TranscriptTooShort(trimmed.chars().count()));
        }

        let prompt = build_prompt(trimmed, options.max_slides);
        let response = self.request_completion(&prompt)?;

        let content = response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| GenerateError::MalformedOutput("no choices in reply".to_string()))?;

        let slides = parse_deck(content, options.max_slides)?;

        Ok(GenerationResult {
            slides,
            metadata: json!({
                "model": self.config.model,
                "usage": response.usage,
            }),
        })
    }
}

fn build_prompt(transcript: &str, max_slides: usize) -> String {
    format!(
        "Create at most {} slides summarizing this lecture transcript. \
         Each slide needs a short title and 2-5 bullet points.\n\n\
         Transcript:\n{}",
        max_slides, transcript
    )
}

/// Strips a leading/trailing markdown code fence if the model wrapped its
/// JSON in one.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence.
    let rest = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parses the model reply into slide drafts. Accepts either the requested
/// `{"slides": [...]}` shape or a bare top-level array. Slides with no
/// bullet content are dropped; the deck is truncated to `max_slides`.
fn parse_deck(raw: &str, max_slides: usize) -> Result<Vec<SlideDraft>, GenerateError> {
    let cleaned = strip_code_fences(raw);
    let value: Value = serde_json::from_str(cleaned)
        .map_err(|e| GenerateError::MalformedOutput(format!("not valid JSON: {}", e)))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("slides") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(GenerateError::MalformedOutput(
                    "missing \"slides\" array".to_string(),
                ))
            }
        },
        _ => {
            return Err(GenerateError::MalformedOutput(
                "expected object or array".to_string(),
            ))
        }
    };

    let mut slides = Vec::new();
    for item in items {
        let draft: SlideDraft = match serde_json::from_value(item) {
            Ok(draft) => draft,
            Err(e) => {
                return Err(GenerateError::MalformedOutput(format!(
                    "bad slide entry: {}",
                    e
                )))
            }
        };
        if draft.content.iter().any(|line| !line.trim().is_empty()) {
            slides.push(draft);
        }
        if slides.len() == max_slides {
            break;
        }
    }

    if slides.is_empty() {
        return Err(GenerateError::EmptyDeck);
    }
    Ok(slides)
}
