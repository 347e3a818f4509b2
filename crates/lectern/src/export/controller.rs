//! Export job execution and artifact lifecycle.
//!
//! Export work runs on its own small pool so a burst of exports cannot
//! starve lecture processing. Job state is durable in `export_jobs`;
//! completed artifacts expire after a configurable number of days and a
//! reaper removes the files and flips the rows to `expired`.

use std::sync::Arc;

use serde_json::json;
use tracing::info_span;

use crate::db::{self, export_repo, session_repo, slide_repo, with_schema_heal, Database};
use crate::task::TaskManager;

use super::{ExportError, ExportFormat, Renderer};

/// Path template handed to clients; the HTTP layer maps it to the file.
fn download_url(job_id: &str) -> String {
    format!("/exports/download/{}", job_id)
}

#[derive(Clone)]
pub struct ExportJobController {
    db: Database,
    renderer: Arc<Renderer>,
    tasks: Arc<TaskManager>,
    expiry_days: i64,
}

impl ExportJobController {
    pub fn new(db: Database, renderer: Renderer, workers: usize, expiry_days: i64) -> Self {
        Self {
            db,
            renderer: Arc::new(renderer),
            tasks: Arc::new(TaskManager::new(workers)),
            expiry_days: expiry_days.max(1),
        }
    }

    pub fn tasks(&self) -> &Arc<TaskManager> {
        &self.tasks
    }

    /// Creates a pending job row and queues it for rendering. Returns the
    /// task token for polling; the job ID itself stays the durable handle.
    pub fn submit(
        &self,
        job_id: &str,
        session_id: &str,
        user_id: &str,
        format: &str,
    ) -> Result<String, ExportError> {
        export_repo::insert(
            &self.db,
            job_id,
            session_id,
            user_id,
            format,
            &db::now_timestamp(),
        )?;

        let controller = self.clone();
        let job = job_id.to_string();
        let queued = self.tasks.submit(Box::new(move |_handle| {
            match controller.process_job(&job) {
                Ok(path) => Ok(json!({"job_id": job, "file_path": path})),
                Err(e) => Err(e.to_string()),
            }
        }));

        match queued {
            Ok(token) => Ok(token),
            Err(e) => {
                // Submission only fails once the pool is shut down.
                // Surface that on the job row instead of leaving it
                // pending forever.
                let _ = export_repo::mark_failed(
                    &self.db,
                    job_id,
                    "Export workers are shut down",
                    &db::now_timestamp(),
                );
                Err(ExportError::Queue(e))
            }
        }
    }

    /// Runs one export job to completion, updating the job row along the
    /// way. Returns the rendered file path.
    pub fn process_job(&self, job_id: &str) -> Result<String, ExportError> {
        let span = info_span!("export_job", job = %job_id);
        let _guard = span.enter();

        let job = export_repo::find_by_id(&self.db, job_id)?
            .ok_or_else(|| ExportError::JobNotFound(job_id.to_string()))?;

        export_repo::mark_processing(&self.db, job_id, &db::now_timestamp())?;

        match self.render_job(&job.session_id, &job.format) {
            Ok(path) => {
                let path_str = path.to_string_lossy().into_owned();
                let now = chrono::Utc::now();
                let expires = now + chrono::Duration::days(self.expiry_days);
                with_schema_heal(&self.db, |db| {
                    export_repo::mark_completed(
                        db,
                        job_id,
                        &path_str,
                        &download_url(job_id),
                        &db::format_timestamp(expires),
                        &db::format_timestamp(now),
                    )
                })?;
                Ok(path_str)
            }
            Err(e) => {
                let reason = e.to_string();
                log::error!("Export job {} failed: {}", job_id, reason);
                let write = with_schema_heal(&self.db, |db| {
                    export_repo::mark_failed(db, job_id, &reason, &db::now_timestamp())
                });
                if let Err(write_err) = write {
                    log::error!(
                        "Could not record failure for export job {}: {}",
                        job_id,
                        write_err
                    );
                }
                Err(e)
            }
        }
    }

    fn render_job(&self, session_id: &str, format: &str) -> Result<std::path::PathBuf, ExportError> {
        let format = ExportFormat::parse(format)
            .ok_or_else(|| ExportError::UnsupportedFormat(format.to_string()))?;

        let session = session_repo::find_by_id(&self.db, session_id)?
            .ok_or_else(|| ExportError::SessionNotFound(session_id.to_string()))?;

        let slides = slide_repo::list_for_session(&self.db, session_id)?;
        if slides.is_empty() {
            return Err(ExportError::NoSlides(session_id.to_string()));
        }

        Ok(self.renderer.render(format, &session, &slides)?)
    }

    /// Deletes artifacts of completed jobs past their expiry and marks
    /// the rows expired. Idempotent: already-deleted files are treated as
    /// reaped. Returns how many jobs were expired.
    pub fn reap_expired(&self) -> Result<usize, ExportError> {
        let now = db::now_timestamp();
        let candidates = export_repo::find_expired(&self.db, &now)?;
        let mut reaped = 0;

        for job in candidates {
            if let Some(path) = &job.file_path {
                match std::fs::remove_file(path) {
                    Ok(()) => log::info!("Removed expired export {}", path),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        log::warn!("Could not remove expired export {}: {}", path, e);
                        continue;
                    }
                }
            }
            export_repo::mark_expired(&self.db, &job.id, &now)?;
            reaped += 1;
        }

        Ok(reaped)
    }

    pub fn shutdown(&self) {
        self.tasks.shutdown();
    }

    pub fn wait(&self) {
        self.tasks.wait();
    }
}
