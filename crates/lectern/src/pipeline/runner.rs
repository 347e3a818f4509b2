//! The lecture processing pipeline.
//!
//! One attempt per submission: transcribe the audio, persist the
//! transcript, generate a slide deck, persist the deck, mark the session
//! completed. Any failure marks the session failed with a reason. The
//! temporary audio file is deleted whether the attempt succeeds or not.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::info_span;

use crate::db::{self, session_repo, slide_repo, with_schema_heal, Database};
use crate::db::session_repo::ProcessingStatus;
use crate::db::slide_repo::NewSlide;
use crate::generate::{GenerateOptions, SlideGenerator};
use crate::task::{TaskError, TaskManager};
use crate::transcribe::{Transcriber, Transcription};

use super::error::PipelineError;
use super::progress::{
    NoopProgress, ProgressBroadcaster, ProgressReporter, Stage, StageEvent, TaskProgress,
};

/// Summary of one completed processing run. Stored as the task result so
/// pollers can read it after the fact.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingReport {
    pub session_id: String,
    pub transcript_chars: usize,
    pub slides_generated: usize,
    pub language: String,
    pub duration_seconds: f64,
    pub low_confidence_words: usize,
    pub metadata: Value,
}

/// Orchestrates transcription, generation, and persistence for lecture
/// sessions. Cheap to clone; clones share the database handle, the
/// collaborators, and the worker pool.
#[derive(Clone)]
pub struct ProcessingPipeline {
    db: Database,
    transcriber: Arc<dyn Transcriber>,
    generator: Arc<dyn SlideGenerator>,
    tasks: Arc<TaskManager>,
    broadcaster: ProgressBroadcaster,
    options: GenerateOptions,
}

impl ProcessingPipeline {
    pub fn new(
        db: Database,
        transcriber: Arc<dyn Transcriber>,
        generator: Arc<dyn SlideGenerator>,
        tasks: Arc<TaskManager>,
        options: GenerateOptions,
    ) -> Self {
        Self {
            db,
            transcriber,
            generator,
            tasks,
            broadcaster: ProgressBroadcaster::default(),
            options,
        }
    }

    pub fn tasks(&self) -> &Arc<TaskManager> {
        &self.tasks
    }

    pub fn broadcaster(&self) -> &ProgressBroadcaster {
        &self.broadcaster
    }

    /// Queues a processing run on the worker pool and returns the task
    /// token to poll.
    pub fn submit(&self, session_id: &str, audio_path: PathBuf) -> Result<String, TaskError> {
        let pipeline = self.clone();
        let session_id = session_id.to_string();
        self.tasks.submit(Box::new(move |handle| {
            let reporter =
                TaskProgress::new(handle.clone(), pipeline.broadcaster.clone());
            match pipeline.process_lecture(&session_id, &audio_path, &reporter) {
                Ok(report) => {
                    serde_json::to_value(&report).map_err(|e| e.to_string())
                }
                Err(e) => Err(e.to_string()),
            }
        }))
    }

    /// Runs one processing attempt synchronously on the calling thread.
    /// The audio file at `audio_path` is deleted before this returns, on
    /// both the success and the failure path.
    pub fn process_lecture(
        &self,
        session_id: &str,
        audio_path: &Path,
        reporter: &dyn ProgressReporter,
    ) -> Result<ProcessingReport, PipelineError> {
        let span = info_span!("process_lecture", session = %session_id);
        let _guard = span.enter();

        let result = self.run_attempt(session_id, audio_path, reporter);
        cleanup_audio_file(audio_path);

        match result {
            Ok(report) => {
                log::info!(
                    "Session {} processed: {} slides from {} transcript chars",
                    session_id,
                    report.slides_generated,
                    report.transcript_chars
                );
                reporter.report(StageEvent::new(
                    session_id,
                    Stage::Completed,
                    "Processing complete",
                ));
                Ok(report)
            }
            Err(e) => {
                let reason = e.to_string();
                log::error!(
                    "Session {} failed ({:?}): {}",
                    session_id,
                    e.kind(),
                    reason
                );
                self.mark_failed(session_id, &reason);
                reporter.report(StageEvent::failed(session_id, reason));
                Err(e)
            }
        }
    }

    fn run_attempt(
        &self,
        session_id: &str,
        audio_path: &Path,
        reporter: &dyn ProgressReporter,
    ) -> Result<ProcessingReport, PipelineError> {
        // Entering `processing` also clears any previous failure reason.
        let found = session_repo::set_status(
            &self.db,
            session_id,
            ProcessingStatus::Processing,
            None,
            &db::now_timestamp(),
        )?;
        if !found {
            return Err(PipelineError::SessionNotFound(session_id.to_string()));
        }

        reporter.report(StageEvent::new(
            session_id,
            Stage::Transcribing,
            "Transcribing audio",
        ));
        let transcription = self.transcriber.transcribe(audio_path)?;

        // The transcript is persisted on its own before generation, so a
        // generation failure still leaves it queryable.
        with_schema_heal(&self.db, |db| {
            session_repo::update_transcript(
                db,
                session_id,
                &transcription.text,
                transcription.duration_seconds.round() as i64,
                &transcription.language,
                &db::now_timestamp(),
            )?;
            Ok(())
        })?;

        reporter.report(StageEvent::new(
            session_id,
            Stage::Generating,
            "Generating slides",
        ));
        let generated = self
            .generator
            .generate(&transcription.text, &self.options)?;

        reporter.report(StageEvent::new(
            session_id,
            Stage::Persisting,
            "Saving slide deck",
        ));
        let slides = build_slides(&generated.slides, &transcription);
        with_schema_heal(&self.db, |db| {
            slide_repo::replace_for_session(db, session_id, &slides, &db::now_timestamp())
        })?;

        session_repo::set_status(
            &self.db,
            session_id,
            ProcessingStatus::Completed,
            None,
            &db::now_timestamp(),
        )?;

        Ok(ProcessingReport {
            session_id: session_id.to_string(),
            transcript_chars: transcription.text.chars().count(),
            slides_generated: slides.len(),
            language: transcription.language.clone(),
            duration_seconds: transcription.duration_seconds,
            low_confidence_words: transcription.low_confidence_words.len(),
            metadata: generated.metadata,
        })
    }

    /// Best effort: the original error is what the caller needs to see,
    /// not a follow-on status-write failure.
    fn mark_failed(&self, session_id: &str, reason: &str) {
        let write = with_schema_heal(&self.db, |db| {
            session_repo::set_status(
                db,
                session_id,
                ProcessingStatus::Failed,
                Some(reason),
                &db::now_timestamp(),
            )
        });
        if let Err(e) = write {
            log::error!(
                "Could not record failure for session {}: {}",
                session_id,
                e
            );
        }
    }
}

/// Numbers the generated drafts 1..N. Word confidence comes back from the
/// engine per transcript, not per slide, so the same summary blob rides
/// on each slide row.
fn build_slides(drafts: &[crate::generate::SlideDraft], transcription: &Transcription) -> Vec<NewSlide> {
    let confidence = if transcription.low_confidence_words.is_empty() {
        None
    } else {
        Some(json!({
            "low_confidence_words": transcription.low_confidence_words,
        }))
    };

    drafts
        .iter()
        .enumerate()
        .map(|(i, draft)| NewSlide {
            slide_number: (i + 1) as i64,
            title: draft.title.clone(),
            content: draft.content.clone(),
            confidence_data: confidence.clone(),
        })
        .collect()
}

/// Removes the temporary audio file. Already-gone is fine; anything else
/// is logged and swallowed, since the attempt's outcome is decided by
/// then.
fn cleanup_audio_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => log::debug!("Removed temporary audio file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!(
            "Could not remove temporary audio file {}: {}",
            path.display(),
            e
        ),
    }
}

/// Runs a processing attempt without task tracking or live progress.
pub fn process_untracked(
    pipeline: &ProcessingPipeline,
    session_id: &str,
    audio_path: &Path,
) -> Result<ProcessingReport, PipelineError> {
    pipeline.process_lecture(session_id, audio_path, &NoopProgress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::{GenerateError, GenerationResult, SlideDraft};
    use crate::transcribe::{LowConfidenceWord, TranscribeError};
    use std::io::Write;

    struct FixedTranscriber {
        text: String,
        fail: bool,
    }

    impl Transcriber for FixedTranscriber {
        fn transcribe(&self, audio_path: &Path) -> Result<Transcription, TranscribeError> {
            if self.fail {
                return Err(TranscribeError::Engine("engine unavailable".to_string()));
            }
            if !audio_path.exists() {
                return Err(TranscribeError::MissingFile(audio_path.to_path_buf()));
            }
            Ok(Transcription {
                text: self.text.clone(),
                duration_seconds: 120.0,
                language: "en".to_string(),
                low_confidence_words: vec![LowConfidenceWord {
                    word: "eigen".to_string(),
                    confidence: 0.4,
                    start_seconds: 3.0,
                }],
            })
        }
    }

    struct FixedGenerator {
        fail: bool,
    }

    impl SlideGenerator for FixedGenerator {
        fn generate(
            &self,
            _transcript: &str,
            _options: &GenerateOptions,
        ) -> Result<GenerationResult, GenerateError> {
            if self.fail {
                return Err(GenerateError::Backend("model overloaded".to_string()));
            }
            Ok(GenerationResult {
                slides: vec![
                    SlideDraft {
                        title: "Intro".to_string(),
                        content: vec!["point one".to_string()],
                    },
                    SlideDraft {
                        title: "Detail".to_string(),
                        content: vec!["point two".to_string()],
                    },
                ],
                metadata: json!({"model": "fixed"}),
            })
        }
    }

    fn pipeline_with(transcriber_fails: bool, generator_fails: bool) -> ProcessingPipeline {
        let db = Database::open_in_memory().unwrap();
        session_repo::insert(&db, "s1", Some("Lecture"), &db::now_timestamp()).unwrap();
        ProcessingPipeline::new(
            db,
            Arc::new(FixedTranscriber {
                text: "a ".repeat(60),
                fail: transcriber_fails,
            }),
            Arc::new(FixedGenerator {
                fail: generator_fails,
            }),
            Arc::new(TaskManager::new(1)),
            GenerateOptions::default(),
        )
    }

    fn temp_audio() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.wav");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"RIFF....").unwrap();
        (dir, path)
    }

    #[test]
    fn test_happy_path_marks_completed_and_cleans_audio() {
        let pipeline = pipeline_with(false, false);
        let (_dir, audio) = temp_audio();

        let report = process_untracked(&pipeline, "s1", &audio).unwrap();
        assert_eq!(report.slides_generated, 2);
        assert_eq!(report.language, "en");
        assert_eq!(report.low_confidence_words, 1);
        assert!(!audio.exists());

        let session = session_repo::find_by_id(&pipeline.db, "s1").unwrap().unwrap();
        assert_eq!(session.status(), ProcessingStatus::Completed);
        assert!(session.transcript.is_some());
        assert_eq!(session.language.as_deref(), Some("en"));
        assert_eq!(session.audio_duration_seconds, Some(120));

        let deck = slide_repo::list_for_session(&pipeline.db, "s1").unwrap();
        assert_eq!(deck.len(), 2);
        assert_eq!(deck[0].slide_number, 1);
        assert_eq!(deck[1].slide_number, 2);
        assert!(deck[0].confidence_data.is_some());
    }

    #[test]
    fn test_transcription_failure_marks_failed_and_cleans_audio() {
        let pipeline = pipeline_with(true, false);
        let (_dir, audio) = temp_audio();

        let err = process_untracked(&pipeline, "s1", &audio).unwrap_err();
        assert!(matches!(err, PipelineError::Transcription(_)));
        assert!(!audio.exists());

        let session = session_repo::find_by_id(&pipeline.db, "s1").unwrap().unwrap();
        assert_eq!(session.status(), ProcessingStatus::Failed);
        assert!(session
            .error
            .as_deref()
            .unwrap()
            .contains("engine unavailable"));
    }

    #[test]
    fn test_generation_failure_keeps_transcript() {
        let pipeline = pipeline_with(false, true);
        let (_dir, audio) = temp_audio();

        let err = process_untracked(&pipeline, "s1", &audio).unwrap_err();
        assert!(matches!(err, PipelineError::Generation(_)));

        let session = session_repo::find_by_id(&pipeline.db, "s1").unwrap().unwrap();
        assert_eq!(session.status(), ProcessingStatus::Failed);
        // Transcript survived the generation failure.
        assert!(session.transcript.is_some());
        assert_eq!(slide_repo::count_for_session(&pipeline.db, "s1").unwrap(), 0);
    }

    #[test]
    fn test_unknown_session_is_input_error() {
        let pipeline = pipeline_with(false, false);
        let (_dir, audio) = temp_audio();

        let err = process_untracked(&pipeline, "missing", &audio).unwrap_err();
        assert!(matches!(err, PipelineError::SessionNotFound(_)));
        // The audio is cleaned up even on this path.
        assert!(!audio.exists());
    }

    #[test]
    fn test_reprocessing_replaces_previous_deck() {
        let pipeline = pipeline_with(false, false);

        let (_dir1, audio1) = temp_audio();
        process_untracked(&pipeline, "s1", &audio1).unwrap();

        let (_dir2, audio2) = temp_audio();
        process_untracked(&pipeline, "s1", &audio2).unwrap();

        // Same deck size, not doubled.
        assert_eq!(slide_repo::count_for_session(&pipeline.db, "s1").unwrap(), 2);
    }

    #[test]
    fn test_missing_audio_reported_as_input() {
        let pipeline = pipeline_with(false, false);
        let err = process_untracked(&pipeline, "s1", Path::new("/nonexistent/a.wav"))
            .unwrap_err();
        assert_eq!(err.kind(), crate::pipeline::ErrorKind::Input);
    }
}
