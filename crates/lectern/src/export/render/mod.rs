//! Deck rendering to export files.

use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::db::session_repo::SessionRow;
use crate::db::slide_repo::SlideRow;

use super::ExportFormat;

mod pdf;
mod pptx;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to write export file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF encoding failed: {0}")]
    Pdf(String),
    #[error("PPTX encoding failed: {0}")]
    Pptx(String),
}

/// Renders slide decks into files under a fixed output directory.
pub struct Renderer {
    output_dir: PathBuf,
}

impl Renderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Renders the deck and returns the path of the written file. File
    /// names carry a random suffix so re-exports never clobber an
    /// artifact another job already handed out.
    pub fn render(
        &self,
        format: ExportFormat,
        session: &SessionRow,
        slides: &[SlideRow],
    ) -> Result<PathBuf, RenderError> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| RenderError::Io {
            path: self.output_dir.clone(),
            source: e,
        })?;

        let token = Uuid::new_v4().simple().to_string();
        let filename = format!(
            "slides_{}_{}.{}",
            session.id,
            &token[..8],
            format.extension()
        );
        let path = self.output_dir.join(filename);

        let title = session.title.as_deref().unwrap_or("Lecture slides");
        match format {
            ExportFormat::Pdf => pdf::write_pdf(&path, title, slides)?,
            ExportFormat::Pptx => pptx::write_pptx(&path, title, slides)?,
        }

        log::info!(
            "Rendered {} deck for session {} to {}",
            format,
            session.id,
            path.display()
        );
        Ok(path)
    }
}
