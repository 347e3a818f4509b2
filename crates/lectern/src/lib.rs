//! Lectern turns lecture recordings into slide decks.
//!
//! An uploaded recording is transcribed, the transcript is distilled
//! into a slide deck, and both are persisted in SQLite. Processing runs
//! in the background on a bounded worker pool; callers poll a task
//! token or the durable session row. Finished decks can be exported to
//! PDF or PPTX files that expire and get reaped after a configurable
//! number of days.

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod generate;
pub mod pipeline;
pub mod service;
pub mod task;
pub mod transcribe;

pub use config::Settings;
pub use error::{LecternError, Result};
pub use service::{ExportStatusInfo, LectureService};
