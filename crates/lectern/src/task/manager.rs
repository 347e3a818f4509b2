//! Worker pool and task registry.
//!
//! Tasks are submitted as closures and executed by a fixed set of worker
//! threads fed from a bounded channel. Each task gets an opaque token the
//! caller can poll for status, progress, and result. Cancellation only
//! works before a worker picks the task up; a running task always runs to
//! completion.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Default queue capacity. Submissions beyond this block the caller until
/// a worker drains the queue.
const QUEUE_CAPACITY: usize = 64;

/// How often an idle worker re-checks the shutdown flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task manager is shut down")]
    ShutDown,
    #[error("Task queue is closed")]
    ChannelClosed,
    #[error("Task registry lock poisoned")]
    LockPoisoned,
}

/// Execution state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// A snapshot of one task's state.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub token: String,
    pub status: TaskStatus,
    /// 0..=100 once the task starts reporting.
    pub progress: Option<u8>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

type Registry = Arc<Mutex<HashMap<String, TaskRecord>>>;

/// Work unit: runs on a worker thread, reports progress through the
/// handle, and returns a JSON result or an error message.
pub type TaskFn = Box<dyn FnOnce(&TaskHandle) -> Result<Value, String> + Send>;

struct QueuedTask {
    token: String,
    work: TaskFn,
}

/// Handed to a running task so it can report progress for its own token.
#[derive(Clone)]
pub struct TaskHandle {
    token: String,
    registry: Registry,
}

impl TaskHandle {
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Records progress for this task. Clamped to 100; ignored once the
    /// task has reached a terminal state.
    pub fn update_progress(&self, percent: u8) {
        update_progress_in(&self.registry, &self.token, percent);
    }
}

/// Fixed-size worker pool with per-task status tracking.
pub struct TaskManager {
    sender: Sender<QueuedTask>,
    registry: Registry,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
}

impl TaskManager {
    /// Spawns `worker_count` worker threads (at least one).
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (sender, receiver) = bounded::<QueuedTask>(QUEUE_CAPACITY);
        let registry: Registry = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let receiver = receiver.clone();
            let registry = Arc::clone(&registry);
            let shutdown = Arc::clone(&shutdown);
            let handle = std::thread::Builder::new()
                .name(format!("task-worker-{}", i))
                .spawn(move || run_worker(receiver, registry, shutdown))
                .unwrap_or_else(|e| panic!("Failed to spawn worker thread: {}", e));
            workers.push(handle);
        }

        log::info!("Task manager started with {} workers", worker_count);

        Self {
            sender,
            registry,
            workers: Mutex::new(workers),
            shutdown,
        }
    }

    /// Enqueues a task and returns its token. The record is registered as
    /// `pending` before the task is enqueued, so a status poll immediately
    /// after submit never misses it.
    pub fn submit(&self, work: TaskFn) -> Result<String, TaskError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(TaskError::ShutDown);
        }

        let token = Uuid::new_v4().to_string();
        let record = TaskRecord {
            token: token.clone(),
            status: TaskStatus::Pending,
            progress: None,
            result: None,
            error: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        };

        {
            let mut registry = self.registry.lock().map_err(|_| TaskError::LockPoisoned)?;
            registry.insert(token.clone(), record);
        }

        self.sender
            .send(QueuedTask {
                token: token.clone(),
                work,
            })
            .map_err(|_| TaskError::ChannelClosed)?;

        Ok(token)
    }

    /// Snapshot of a task's current state, or None for an unknown token.
    pub fn status(&self, token: &str) -> Option<TaskRecord> {
        self.registry
            .lock()
            .ok()
            .and_then(|registry| registry.get(token).cloned())
    }

    /// Records progress for a task. Unknown tokens and terminal tasks are
    /// ignored.
    pub fn update_progress(&self, token: &str, percent: u8) {
        update_progress_in(&self.registry, token, percent);
    }

    /// Cancels a task that has not started yet. Returns true only if the
    /// task was still pending; once a worker has picked it up the only
    /// option is to let it finish.
    pub fn cancel(&self, token: &str) -> bool {
        let Ok(mut registry) = self.registry.lock() else {
            return false;
        };
        match registry.get_mut(token) {
            Some(record) if record.status == TaskStatus::Pending => {
                record.status = TaskStatus::Failed;
                record.error = Some("cancelled before start".to_string());
                record.completed_at = Some(chrono::Utc::now());
                true
            }
            _ => false,
        }
    }

    /// Removes terminal records older than `age`, measured from their
    /// completion time. Returns how many were removed.
    pub fn cleanup_older_than(&self, age: chrono::Duration) -> usize {
        let Ok(mut registry) = self.registry.lock() else {
            return 0;
        };
        let cutoff = chrono::Utc::now() - age;
        let before = registry.len();
        registry.retain(|_, record| {
            !(record.status.is_terminal()
                && record.completed_at.map(|t| t < cutoff).unwrap_or(false))
        });
        before - registry.len()
    }

    /// Number of records currently tracked (any state).
    pub fn tracked_count(&self) -> usize {
        self.registry.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Signals workers to stop once the queue drains.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Blocks until all worker threads have exited. Call after
    /// `shutdown`; workers notice the flag within one poll interval.
    pub fn wait(&self) {
        let handles = {
            let Ok(mut workers) = self.workers.lock() else {
                return;
            };
            std::mem::take(&mut *workers)
        };
        for handle in handles {
            if handle.join().is_err() {
                log::error!("Worker thread panicked during shutdown");
            }
        }
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn update_progress_in(registry: &Registry, token: &str, percent: u8) {
    let Ok(mut registry) = registry.lock() else {
        return;
    };
    if let Some(record) = registry.get_mut(token) {
        if !record.status.is_terminal() {
            record.progress = Some(percent.min(100));
        }
    }
}

fn run_worker(receiver: Receiver<QueuedTask>, registry: Registry, shutdown: Arc<AtomicBool>) {
    loop {
        match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(task) => execute(task, &registry),
            Err(RecvTimeoutError::Timeout) => {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn execute(task: QueuedTask, registry: &Registry) {
    // A cancelled task may still be sitting in the queue; skip it.
    {
        let Ok(mut guard) = registry.lock() else {
            return;
        };
        match guard.get_mut(&task.token) {
            Some(record) if record.status == TaskStatus::Pending => {
                record.status = TaskStatus::Processing;
                record.started_at = Some(chrono::Utc::now());
            }
            _ => return,
        }
    }

    let handle = TaskHandle {
        token: task.token.clone(),
        registry: Arc::clone(registry),
    };

    let outcome = catch_unwind(AssertUnwindSafe(move || (task.work)(&handle)));

    let Ok(mut guard) = registry.lock() else {
        return;
    };
    let Some(record) = guard.get_mut(&task.token) else {
        return;
    };
    record.completed_at = Some(chrono::Utc::now());
    match outcome {
        Ok(Ok(value)) => {
            record.status = TaskStatus::Completed;
            record.progress = Some(100);
            record.result = Some(value);
        }
        Ok(Err(message)) => {
            log::error!("Task {} failed: {}", task.token, message);
            record.status = TaskStatus::Failed;
            record.error = Some(message);
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "task panicked".to_string());
            log::error!("Task {} panicked: {}", task.token, message);
            record.status = TaskStatus::Failed;
            record.error = Some(message);
        }
    }
}
