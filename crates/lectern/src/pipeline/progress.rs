//! Pipeline progress reporting.
//!
//! Stage transitions are pushed two ways: into the task registry (for
//! pollers holding a task token) and onto a broadcast channel (for live
//! subscribers such as a websocket layer).

use serde::Serialize;
use tokio::sync::broadcast;

use crate::task::TaskHandle;

/// Pipeline stages in execution order, each with a coarse overall
/// percentage. The numbers are waypoints, not measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Queued,
    Transcribing,
    Generating,
    Persisting,
    Completed,
    Failed,
}

impl Stage {
    pub fn percent(&self) -> u8 {
        match self {
            Stage::Queued => 0,
            Stage::Transcribing => 10,
            Stage::Generating => 45,
            Stage::Persisting => 80,
            Stage::Completed => 100,
            Stage::Failed => 100,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Queued => "queued",
            Stage::Transcribing => "transcribing",
            Stage::Generating => "generating",
            Stage::Persisting => "persisting",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }
}

/// One progress event for one session.
#[derive(Debug, Clone, Serialize)]
pub struct StageEvent {
    pub session_id: String,
    pub stage: Stage,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub error: Option<String>,
}

impl StageEvent {
    pub fn new(session_id: &str, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.to_string(),
            stage,
            message: message.into(),
            timestamp: chrono::Utc::now(),
            error: None,
        }
    }

    pub fn failed(session_id: &str, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            session_id: session_id.to_string(),
            stage: Stage::Failed,
            message: "Processing failed".to_string(),
            timestamp: chrono::Utc::now(),
            error: Some(error),
        }
    }
}

/// Sink for pipeline stage transitions.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: StageEvent);
}

/// Discards all events. Used in tests and for fire-and-forget callers.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: StageEvent) {}
}

/// Fan-out channel for live progress subscribers. Lagging subscribers
/// drop old events rather than blocking the pipeline.
#[derive(Clone)]
pub struct ProgressBroadcaster {
    sender: broadcast::Sender<StageEvent>,
}

impl ProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StageEvent> {
        self.sender.subscribe()
    }

    pub fn send(&self, event: StageEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Reporter wired to a running task: mirrors stage percentages into the
/// task registry and fans events out to broadcast subscribers.
pub struct TaskProgress {
    handle: TaskHandle,
    broadcaster: ProgressBroadcaster,
}

impl TaskProgress {
    pub fn new(handle: TaskHandle, broadcaster: ProgressBroadcaster) -> Self {
        Self {
            handle,
            broadcaster,
        }
    }
}

impl ProgressReporter for TaskProgress {
    fn report(&self, event: StageEvent) {
        self.handle.update_progress(event.stage.percent());
        log::debug!(
            "Session {} entered stage {} ({}%)",
            event.session_id,
            event.stage.as_str(),
            event.stage.percent()
        );
        self.broadcaster.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_percentages_ascend() {
        let stages = [
            Stage::Queued,
            Stage::Transcribing,
            Stage::Generating,
            Stage::Persisting,
            Stage::Completed,
        ];
        for pair in stages.windows(2) {
            assert!(pair[0].percent() < pair[1].percent());
        }
    }

    #[test]
    fn test_broadcaster_delivers_to_subscriber() {
        let broadcaster = ProgressBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();
        broadcaster.send(StageEvent::new("s1", Stage::Transcribing, "Transcribing audio"));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.session_id, "s1");
        assert_eq!(event.stage, Stage::Transcribing);
        assert!(event.error.is_none());
    }

    #[test]
    fn test_broadcaster_without_subscribers_does_not_panic() {
        let broadcaster = ProgressBroadcaster::new(8);
        broadcaster.send(StageEvent::failed("s1", "engine down"));
    }

    #[test]
    fn test_failed_event_carries_error() {
        let event = StageEvent::failed("s1", "transcription failed");
        assert_eq!(event.stage, Stage::Failed);
        assert_eq!(event.error.as_deref(), Some("transcription failed"));
    }
}
