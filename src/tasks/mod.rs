//! Background work for the CLI.
//!
//! Imports and analysis batches run on worker threads and report through
//! [`TaskUpdate`] messages. The command waits on a [`BackgroundTaskManager`],
//! which also forwards an interrupt to every worker's cancel flag.

pub mod analysis;
pub mod manager;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use analysis::{AnalysisWorker, MediaLocks};
pub use manager::BackgroundTaskManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub u64);

impl TaskId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        TaskId(COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Import,
    Analysis,
}

impl TaskType {
    pub fn name(&self) -> &'static str {
        match self {
            TaskType::Import => "import",
            TaskType::Analysis => "analysis",
        }
    }
}

/// Items processed so far, and the one last handled.
#[derive(Debug, Clone)]
pub struct TaskProgress {
    pub current: usize,
    pub total: usize,
    pub current_item: Option<String>,
}

impl TaskProgress {
    pub fn new(current: usize, total: usize) -> Self {
        Self {
            current,
            total,
            current_item: None,
        }
    }

    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.current_item = Some(item.into());
        self
    }

    /// Progress percentage (0-100).
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            0
        } else {
            ((self.current as f64 / self.total as f64) * 100.0).min(100.0) as u8
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Completed,
    Cancelled,
    Failed(String),
}

/// Messages a worker sends over its channel. Every worker ends with exactly
/// one of `Completed`, `Cancelled` or `Failed`.
#[derive(Debug, Clone)]
pub enum TaskUpdate {
    Started { total: usize },
    Progress(TaskProgress),
    Completed { message: String },
    Cancelled,
    Failed { error: String },
}

/// A registered task as seen from the waiting side.
pub struct BackgroundTask {
    pub id: TaskId,
    pub task_type: TaskType,
    pub state: TaskState,
    pub progress: Option<TaskProgress>,
    cancel_flag: Arc<AtomicBool>,
    receiver: mpsc::Receiver<TaskUpdate>,
    started_at: Instant,
}

impl BackgroundTask {
    fn new(task_type: TaskType, cancel_flag: Arc<AtomicBool>, receiver: mpsc::Receiver<TaskUpdate>) -> Self {
        Self {
            id: TaskId::new(),
            task_type,
            state: TaskState::Running,
            progress: None,
            cancel_flag,
            receiver,
            started_at: Instant::now(),
        }
    }

    fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.state == TaskState::Running
    }
}

/// How a task ended.
#[derive(Debug, Clone)]
pub struct TaskCompletionInfo {
    pub id: TaskId,
    pub task_type: TaskType,
    pub state: TaskState,
    /// Summary from the worker, or the failure reason.
    pub message: String,
    pub elapsed: Duration,
}

impl TaskCompletionInfo {
    pub fn is_success(&self) -> bool {
        self.state == TaskState::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_ids_are_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(TaskProgress::new(0, 0).percent(), 0);
        assert_eq!(TaskProgress::new(1, 4).percent(), 25);
        assert_eq!(TaskProgress::new(5, 4).percent(), 100);
    }

    #[test]
    fn test_cancel_sets_shared_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let (_tx, rx) = mpsc::channel();
        let task = BackgroundTask::new(TaskType::Import, flag.clone(), rx);

        assert!(task.is_running());
        task.cancel();
        assert!(flag.load(Ordering::SeqCst));
    }
}
