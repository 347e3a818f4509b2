//! Shared fixtures for integration tests.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lectern::config::Settings;
use lectern::generate::{
    GenerateError, GenerateOptions, GenerationResult, SlideDraft, SlideGenerator,
};
use lectern::service::LectureService;
use lectern::task::{TaskRecord, TaskStatus};
use lectern::transcribe::{LowConfidenceWord, TranscribeError, Transcriber, Transcription};

pub struct FakeTranscriber {
    pub text: String,
    pub fail: Arc<AtomicBool>,
}

impl FakeTranscriber {
    pub fn ok(text: &str) -> (Self, Arc<AtomicBool>) {
        let fail = Arc::new(AtomicBool::new(false));
        (
            Self {
                text: text.to_string(),
                fail: Arc::clone(&fail),
            },
            fail,
        )
    }
}

impl Transcriber for FakeTranscriber {
    fn transcribe(&self, audio_path: &Path) -> Result<Transcription, TranscribeError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TranscribeError::Engine("fake engine down".to_string()));
        }
        if !audio_path.exists() {
            return Err(TranscribeError::MissingFile(audio_path.to_path_buf()));
        }
        Ok(Transcription {
            text: self.text.clone(),
            duration_seconds: 90.0,
            language: "en".to_string(),
            low_confidence_words: vec![LowConfidenceWord {
                word: "quaternion".to_string(),
                confidence: 0.35,
                start_seconds: 12.0,
            }],
        })
    }
}

pub struct FakeGenerator {
    pub slides: usize,
    pub fail: Arc<AtomicBool>,
}

impl FakeGenerator {
    pub fn ok(slides: usize) -> (Self, Arc<AtomicBool>) {
        let fail = Arc::new(AtomicBool::new(false));
        (
            Self {
                slides,
                fail: Arc::clone(&fail),
            },
            fail,
        )
    }
}

impl SlideGenerator for FakeGenerator {
    fn generate(
        &self,
        transcript: &str,
        options: &GenerateOptions,
    ) -> Result<GenerationResult, GenerateError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GenerateError::Backend("fake model overloaded".to_string()));
        }
        let count = transcript.chars().count();
        if count < lectern::generate::MIN_TRANSCRIPT_CHARS {
            return Err(GenerateError::TranscriptTooShort(count));
        }
        let slides = (1..=self.slides.min(options.max_slides))
            .map(|n| SlideDraft {
                title: format!("Topic {}", n),
                content: vec![format!("Key point {}", n), "Details".to_string()],
            })
            .collect();
        Ok(GenerationResult {
            slides,
            metadata: serde_json::json!({"model": "fake"}),
        })
    }
}

pub struct TestHarness {
    pub service: LectureService,
    pub transcriber_fail: Arc<AtomicBool>,
    pub generator_fail: Arc<AtomicBool>,
    // Held for the lifetime of the harness so paths stay valid.
    pub dir: tempfile::TempDir,
}

pub fn harness() -> TestHarness {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = Settings {
        database_path: Some(dir.path().join("lectern.db")),
        export_dir: dir.path().join("exports"),
        ..Settings::default()
    };

    let (transcriber, transcriber_fail) = FakeTranscriber::ok(&"lecture content ".repeat(10));
    let (generator, generator_fail) = FakeGenerator::ok(3);

    let service = LectureService::new(&settings, Arc::new(transcriber), Arc::new(generator))
        .expect("service");

    TestHarness {
        service,
        transcriber_fail,
        generator_fail,
        dir,
    }
}

pub fn write_audio(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).expect("audio file");
    f.write_all(b"RIFF fake audio").expect("write audio");
    path
}

pub fn wait_for_terminal(service: &LectureService, token: &str) -> TaskRecord {
    for _ in 0..400 {
        if let Some(record) = service.task_status(token) {
            if matches!(record.status, TaskStatus::Completed | TaskStatus::Failed) {
                return record;
            }
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("task {} never finished", token);
}
