//! The top-level service facade.
//!
//! Wires together the database, the processing pipeline, and the export
//! controller. An HTTP layer (or a test) talks to this type only.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::config::Settings;
use crate::db::{self, export_repo, session_repo, Database};
use crate::db::export_repo::ExportJobStatus;
use crate::db::session_repo::SessionRow;
use crate::error::{LecternError, Result};
use crate::export::{ExportJobController, Renderer};
use crate::generate::http::GeneratorConfig;
use crate::generate::{GenerateOptions, HttpSlideGenerator, SlideGenerator};
use crate::pipeline::{ProcessingPipeline, ProgressBroadcaster, StageEvent};
use crate::task::{TaskManager, TaskRecord};
use crate::transcribe::{HttpTranscriber, Transcriber};

/// Client-facing view of an export job.
#[derive(Debug, Clone, Serialize)]
pub struct ExportStatusInfo {
    pub job_id: String,
    pub status: ExportJobStatus,
    /// Only present while the artifact is downloadable.
    pub download_url: Option<String>,
    pub error_message: Option<String>,
    pub expires_at: Option<String>,
}

pub struct LectureService {
    db: Database,
    pipeline: ProcessingPipeline,
    exports: ExportJobController,
}

impl LectureService {
    /// Builds a service with explicit collaborators. Tests use this with
    /// fakes; `from_settings` is the production path.
    pub fn new(
        settings: &Settings,
        transcriber: Arc<dyn Transcriber>,
        generator: Arc<dyn SlideGenerator>,
    ) -> Result<Self> {
        let db_path = match &settings.database_path {
            Some(path) => path.clone(),
            None => db::default_database_path().unwrap_or_else(|| PathBuf::from("lectern.db")),
        };
        let database = Database::open(&db_path)?;

        let pipeline = ProcessingPipeline::new(
            database.clone(),
            transcriber,
            generator,
            Arc::new(TaskManager::new(settings.pipeline_workers)),
            GenerateOptions {
                max_slides: settings.max_slides,
            },
        );

        let exports = ExportJobController::new(
            database.clone(),
            Renderer::new(&settings.export_dir),
            settings.export_workers,
            settings.export_expiry_days,
        );

        Ok(Self {
            db: database,
            pipeline,
            exports,
        })
    }

    /// Builds a service with HTTP collaborators from the settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let transcriber = HttpTranscriber::new(settings.transcription_endpoint.clone())?;
        let generator = HttpSlideGenerator::new(GeneratorConfig {
            endpoint: settings.generation.endpoint.clone(),
            model: settings.generation.model.clone(),
            api_key: settings.generation.api_key.clone(),
        })?;
        Self::new(settings, Arc::new(transcriber), Arc::new(generator))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Creates a pending session and returns its ID.
    pub fn create_session(&self, title: Option<&str>) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        session_repo::insert(&self.db, &id, title, &db::now_timestamp())?;
        log::info!("Created session {}", id);
        Ok(id)
    }

    /// Queues processing of an uploaded recording. The file at
    /// `audio_path` is owned by the pipeline from here on and will be
    /// deleted when the attempt finishes.
    pub fn submit_processing(&self, session_id: &str, audio_path: PathBuf) -> Result<String> {
        Ok(self.pipeline.submit(session_id, audio_path)?)
    }

    /// Durable session state, straight from the database. Survives
    /// restarts, unlike task records.
    pub fn processing_status(&self, session_id: &str) -> Result<Option<SessionRow>> {
        Ok(session_repo::find_by_id(&self.db, session_id)?)
    }

    /// In-memory record for a task token, checking both worker pools.
    pub fn task_status(&self, token: &str) -> Option<TaskRecord> {
        self.pipeline
            .tasks()
            .status(token)
            .or_else(|| self.exports.tasks().status(token))
    }

    /// Cancels a queued (not yet started) processing task.
    pub fn cancel_processing(&self, token: &str) -> bool {
        self.pipeline.tasks().cancel(token)
    }

    /// Queues an export of a session's deck. Returns the durable job ID
    /// and the task token.
    pub fn submit_export(
        &self,
        session_id: &str,
        user_id: &str,
        format: &str,
    ) -> Result<(String, String)> {
        if session_repo::find_by_id(&self.db, session_id)?.is_none() {
            return Err(LecternError::Export(
                crate::export::ExportError::SessionNotFound(session_id.to_string()),
            ));
        }
        let job_id = Uuid::new_v4().to_string();
        let token = self
            .exports
            .submit(&job_id, session_id, user_id, format)?;
        Ok((job_id, token))
    }

    /// Client view of an export job. The download link disappears the
    /// moment the expiry timestamp passes, even before the reaper runs.
    pub fn export_status(&self, job_id: &str) -> Result<Option<ExportStatusInfo>> {
        let Some(job) = export_repo::find_by_id(&self.db, job_id)? else {
            return Ok(None);
        };

        let status = job.status();
        let expired_now =
            status == ExportJobStatus::Completed && job.is_past_expiry(&db::now_timestamp());

        let (status, download_url) = if expired_now {
            (ExportJobStatus::Expired, None)
        } else if status == ExportJobStatus::Completed {
            (status, job.download_url.clone())
        } else {
            (status, None)
        };

        Ok(Some(ExportStatusInfo {
            job_id: job.id,
            status,
            download_url,
            error_message: job.error_message,
            expires_at: job.expires_at,
        }))
    }

    /// Runs the export reaper once. Returns how many jobs were expired.
    pub fn reap_expired_exports(&self) -> Result<usize> {
        Ok(self.exports.reap_expired()?)
    }

    /// Drops terminal task records older than `age` from both pools.
    pub fn cleanup_tasks(&self, age: chrono::Duration) -> usize {
        self.pipeline.tasks().cleanup_older_than(age)
            + self.exports.tasks().cleanup_older_than(age)
    }

    pub fn subscribe_progress(&self) -> tokio::sync::broadcast::Receiver<StageEvent> {
        self.pipeline.broadcaster().subscribe()
    }

    pub fn progress_broadcaster(&self) -> &ProgressBroadcaster {
        self.pipeline.broadcaster()
    }

    /// Stops both worker pools and blocks until their threads exit.
    pub fn shutdown(&self) {
        self.pipeline.tasks().shutdown();
        self.exports.shutdown();
        self.pipeline.tasks().wait();
        self.exports.wait();
        log::info!("Service shut down");
    }
}
