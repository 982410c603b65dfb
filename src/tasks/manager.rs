//! Tracks registered tasks and drains their update channels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use super::{BackgroundTask, TaskCompletionInfo, TaskId, TaskProgress, TaskState, TaskType, TaskUpdate};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Default)]
pub struct BackgroundTaskManager {
    tasks: HashMap<TaskId, BackgroundTask>,
    /// Registration order, for display.
    task_order: Vec<TaskId>,
}

impl BackgroundTaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. The worker gets the sender and the cancel flag.
    pub fn register_task(&mut self, task_type: TaskType) -> (TaskId, mpsc::Sender<TaskUpdate>, Arc<AtomicBool>) {
        let (tx, rx) = mpsc::channel();
        let cancel_flag = Arc::new(AtomicBool::new(false));
        let task = BackgroundTask::new(task_type, cancel_flag.clone(), rx);
        let id = task.id;

        tracing::debug!(task_id = id.0, task = task_type.name(), "Task registered");
        self.tasks.insert(id, task);
        self.task_order.push(id);
        (id, tx, cancel_flag)
    }

    /// Ask every running task to stop. Workers check their flag between items.
    pub fn cancel_all(&mut self) {
        for task in self.tasks.values().filter(|t| t.is_running()) {
            task.cancel();
        }
    }

    /// Drain every channel and return the tasks that finished since the last
    /// poll. A worker that hangs up without a final update counts as failed.
    pub fn poll_updates(&mut self) -> Vec<TaskCompletionInfo> {
        let mut completed = Vec::new();

        for id in &self.task_order {
            let Some(task) = self.tasks.get_mut(id) else {
                continue;
            };

            let outcome = loop {
                match task.receiver.try_recv() {
                    Ok(TaskUpdate::Started { total }) => task.progress = Some(TaskProgress::new(0, total)),
                    Ok(TaskUpdate::Progress(progress)) => task.progress = Some(progress),
                    Ok(TaskUpdate::Completed { message }) => break Some((TaskState::Completed, message)),
                    Ok(TaskUpdate::Cancelled) => break Some((TaskState::Cancelled, "Cancelled".to_string())),
                    Ok(TaskUpdate::Failed { error }) => break Some((TaskState::Failed(error.clone()), error)),
                    Err(TryRecvError::Empty) => break None,
                    Err(TryRecvError::Disconnected) => {
                        let error = "worker exited without reporting".to_string();
                        break Some((TaskState::Failed(error.clone()), error));
                    }
                }
            };

            if let Some((state, message)) = outcome {
                tracing::info!(task_id = id.0, task = task.task_type.name(), state = ?state, "Task finished");
                task.state = state.clone();
                completed.push(TaskCompletionInfo {
                    id: *id,
                    task_type: task.task_type,
                    state,
                    message,
                    elapsed: task.started_at.elapsed(),
                });
            }
        }

        for info in &completed {
            self.tasks.remove(&info.id);
            self.task_order.retain(|id| *id != info.id);
        }
        completed
    }

    pub fn running_tasks(&self) -> Vec<&BackgroundTask> {
        self.task_order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .filter(|t| t.is_running())
            .collect()
    }

    pub fn has_running_tasks(&self) -> bool {
        self.tasks.values().any(|t| t.is_running())
    }

    /// Block until every task has finished, calling `on_tick` with the
    /// running tasks between polls. Once `interrupt` is set, every running
    /// task is cancelled.
    pub fn wait(
        &mut self,
        interrupt: &AtomicBool,
        mut on_tick: impl FnMut(&[&BackgroundTask]),
    ) -> Vec<TaskCompletionInfo> {
        let mut finished = Vec::new();
        let mut cancelling = false;

        loop {
            if !cancelling && interrupt.load(Ordering::SeqCst) {
                tracing::info!(tasks = self.tasks.len(), "Interrupted, cancelling running tasks");
                self.cancel_all();
                cancelling = true;
            }

            finished.extend(self.poll_updates());
            if !self.has_running_tasks() {
                return finished;
            }
            on_tick(&self.running_tasks());
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}
