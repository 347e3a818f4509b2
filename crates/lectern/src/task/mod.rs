//! Background task execution.
//!
//! A bounded worker pool with an in-memory registry of task records.
//! Records are ephemeral: durable state (session status, export jobs)
//! lives in the database and survives restarts; these do not.

pub mod manager;

pub use manager::{TaskError, TaskHandle, TaskManager, TaskRecord, TaskStatus};
