//! Slide deck export: render a session's deck to a downloadable file.

use thiserror::Error;

use crate::db::DatabaseError;
use crate::task::TaskError;

pub mod controller;
pub mod render;

pub use controller::ExportJobController;
pub use render::{RenderError, Renderer};

/// Supported export file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Pdf,
    Pptx,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Some(ExportFormat::Pdf),
            "pptx" => Some(ExportFormat::Pptx),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Pptx => "pptx",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Export job not found: {0}")]
    JobNotFound(String),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Session {0} has no slides to export")]
    NoSlides(String),
    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Queue(#[from] TaskError),
}
