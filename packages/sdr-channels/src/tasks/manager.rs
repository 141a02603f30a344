// Task Manager - bookkeeping for the work backing admitted channels
//
// Features:
// - Task registration with a bounded number of active tasks
// - Graceful cancellation via CancellationToken
// - Worker futures spawned on the ambient tokio runtime
// - Pruning of old terminal tasks
// - Thread-safe access via parking_lot::RwLock

use super::types::{ChannelExecutor, TaskError, TaskHandle, TaskInfo, TaskResult, TaskState, TaskTicket};
use crate::types::{Channel, ChannelId};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const MAX_COMPLETED_TASKS: usize = 100;

type TaskTable = Arc<RwLock<HashMap<String, TaskInfo>>>;

pub struct TaskManager {
    tasks: TaskTable,
    handles: RwLock<HashMap<String, TaskHandle>>,
    capacity: Option<usize>,
}

/// Moves a running task into a terminal state. Terminal tasks stay as they are.
fn finish(tasks: &TaskTable, task_id: &str, state: TaskState) -> bool {
    match tasks.write().get_mut(task_id) {
        Some(task) if task.is_active() => {
            task.state = state;
            task.completed_at = Some(Utc::now());
            true
        }
        _ => false,
    }
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            handles: RwLock::new(HashMap::new()),
            capacity: None,
        }
    }

    /// A manager that refuses new tasks once `capacity` are active
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    pub fn register_task(&self, name: impl Into<String>) -> TaskResult<(String, CancellationToken)> {
        let id = uuid::Uuid::new_v4().to_string();
        let cancel_token = CancellationToken::new();

        {
            let mut tasks = self.tasks.write();
            if let Some(capacity) = self.capacity {
                let active = tasks.values().filter(|info| info.is_active()).count();
                if active >= capacity {
                    log::warn!("Task capacity reached ({}/{})", active, capacity);
                    return Err(TaskError::CapacityExceeded { active, capacity });
                }
            }
            tasks.insert(id.clone(), TaskInfo::new(id.clone(), name));
        }

        self.handles
            .write()
            .insert(id.clone(), TaskHandle::new(cancel_token.clone()));

        log::debug!("Task registered: {}", id);
        Ok((id, cancel_token))
    }

    /// Runs a worker for an already registered task on the current tokio
    /// runtime. The worker receives the task's cancellation token; a worker
    /// that returns before being cancelled marks its task completed and frees
    /// its capacity slot.
    pub fn spawn_worker<F, Fut>(&self, task_id: &str, f: F) -> TaskResult<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TaskError::NoRuntime(e.to_string()))?;

        let mut handles = self.handles.write();
        let handle = handles
            .get_mut(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;

        let cancel_token = handle.cancel_token.clone();
        let tasks = Arc::clone(&self.tasks);
        let task_id_clone = task_id.to_string();
        let join_handle = runtime.spawn(async move {
            let token_clone = cancel_token.clone();
            f(cancel_token).await;

            if token_clone.is_cancelled() {
                log::info!("Worker for task {} stopped after cancellation", task_id_clone);
            } else if finish(&tasks, &task_id_clone, TaskState::Completed) {
                log::info!("Task {} completed", task_id_clone);
            }
        });

        handle.join_handle = Some(join_handle);
        Ok(())
    }

    pub fn cancel(&self, task_id: &str) -> TaskResult<()> {
        let handles = self.handles.read();
        if let Some(handle) = handles.get(task_id) {
            if handle.is_cancelled() {
                return Err(TaskError::AlreadyCancelled(task_id.to_string()));
            }
            handle.cancel();
            log::debug!("Cancellation requested for task: {}", task_id);

            drop(handles);
            if finish(&self.tasks, task_id, TaskState::Cancelled) {
                log::info!("Task {} cancelled", task_id);
            }
            Ok(())
        } else {
            Err(TaskError::NotFound(task_id.to_string()))
        }
    }

    pub fn get_task(&self, task_id: &str) -> Option<TaskInfo> {
        self.tasks.read().get(task_id).cloned()
    }

    pub fn get_active_tasks(&self) -> Vec<TaskInfo> {
        self.tasks
            .read()
            .values()
            .filter(|info| info.is_active())
            .cloned()
            .collect()
    }

    /// Forgets a task. A worker still running at this point ignored its
    /// cancellation and is aborted.
    pub fn remove_task(&self, task_id: &str) -> Option<TaskInfo> {
        if let Some(join_handle) = self
            .handles
            .write()
            .remove(task_id)
            .and_then(|handle| handle.join_handle)
        {
            if !join_handle.is_finished() {
                log::warn!("Aborting worker for task {}", task_id);
                join_handle.abort();
            }
        }
        let task = self.tasks.write().remove(task_id);
        if task.is_some() {
            log::debug!("Task {} removed", task_id);
        }
        task
    }

    pub fn cleanup_completed_tasks(&self) {
        let terminal_tasks: Vec<(String, chrono::DateTime<Utc>)> = {
            let tasks = self.tasks.read();
            tasks
                .iter()
                .filter(|(_, info)| info.is_terminal())
                .filter_map(|(id, info)| info.completed_at.map(|t| (id.clone(), t)))
                .collect()
        };

        if terminal_tasks.len() <= MAX_COMPLETED_TASKS {
            return;
        }

        // Oldest first
        let mut sorted: Vec<_> = terminal_tasks;
        sorted.sort_by(|(_, a), (_, b)| a.cmp(b));

        let to_remove = sorted.len() - MAX_COMPLETED_TASKS;
        for (task_id, _) in sorted.into_iter().take(to_remove) {
            self.remove_task(&task_id);
        }

        log::debug!("Cleaned up {} terminal tasks", to_remove);
    }

    pub fn active_count(&self) -> usize {
        self.tasks
            .read()
            .values()
            .filter(|info| info.is_active())
            .count()
    }

    pub fn total_count(&self) -> usize {
        self.tasks.read().len()
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelExecutor for TaskManager {
    fn launch(&self, id: ChannelId, channel: &Channel) -> TaskResult<TaskTicket> {
        let (task_id, cancel_token) = self.register_task(format!("{} @ {}", id, channel))?;
        Ok(TaskTicket {
            task_id,
            cancel_token,
        })
    }

    fn retire(&self, ticket: &TaskTicket) {
        if let Err(e) = self.cancel(&ticket.task_id) {
            log::debug!("Retiring task {}: {}", ticket.task_id, e);
        }
        self.cleanup_completed_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn channel() -> Channel {
        Channel::new(1_000_000_000, 12_500).unwrap()
    }

    #[test]
    fn test_task_registration() {
        let manager = TaskManager::new();
        let (task_id, _token) = manager.register_task("Test Task").unwrap();

        let task = manager.get_task(&task_id).expect("Task should exist");
        assert_eq!(task.name, "Test Task");
        assert_eq!(task.state, TaskState::Running);
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn test_task_cancellation() {
        let manager = TaskManager::new();
        let (task_id, token) = manager.register_task("Test Task").unwrap();

        assert!(!token.is_cancelled());
        manager.cancel(&task_id).unwrap();
        assert!(token.is_cancelled());

        let task = manager.get_task(&task_id).unwrap();
        assert_eq!(task.state, TaskState::Cancelled);
        assert!(task.completed_at.is_some());

        assert!(matches!(
            manager.cancel(&task_id),
            Err(TaskError::AlreadyCancelled(_))
        ));
        assert!(matches!(
            manager.cancel("missing"),
            Err(TaskError::NotFound(_))
        ));
    }

    #[test]
    fn test_capacity_limits_active_tasks() {
        let manager = TaskManager::with_capacity(2);
        let first = manager.launch(ChannelId(1), &channel()).unwrap();
        manager.launch(ChannelId(2), &channel()).unwrap();

        let err = manager.launch(ChannelId(3), &channel()).unwrap_err();
        assert!(matches!(
            err,
            TaskError::CapacityExceeded {
                active: 2,
                capacity: 2
            }
        ));

        // Retiring frees a slot
        manager.retire(&first);
        assert!(first.cancel_token.is_cancelled());
        assert!(manager.launch(ChannelId(3), &channel()).is_ok());
        assert_eq!(manager.active_count(), 2);
    }

    #[test]
    fn test_launch_names_the_channel() {
        let manager = TaskManager::new();
        let ticket = manager.launch(ChannelId(9), &channel()).unwrap();
        let task = manager.get_task(&ticket.task_id).unwrap();
        assert!(task.name.starts_with("channel#9"));
        assert_eq!(manager.get_active_tasks().len(), 1);
    }

    #[test]
    fn test_spawn_worker_without_runtime() {
        let manager = TaskManager::new();
        let (task_id, _) = manager.register_task("Worker").unwrap();
        let err = manager.spawn_worker(&task_id, |_| async {}).unwrap_err();
        assert!(matches!(err, TaskError::NoRuntime(_)));
    }

    #[tokio::test]
    async fn test_spawn_worker_observes_cancellation() {
        let manager = TaskManager::new();
        let ticket = manager.launch(ChannelId(1), &channel()).unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel();
        manager
            .spawn_worker(&ticket.task_id, |cancel_token| async move {
                cancel_token.cancelled().await;
                let _ = tx.send(());
            })
            .unwrap();

        manager.retire(&ticket);
        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("worker should stop after cancellation")
            .unwrap();
        assert_eq!(
            manager.get_task(&ticket.task_id).unwrap().state,
            TaskState::Cancelled
        );
    }

    #[tokio::test]
    async fn test_finished_worker_completes_task() {
        let manager = TaskManager::with_capacity(1);
        let ticket = manager.launch(ChannelId(1), &channel()).unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        manager
            .spawn_worker(&ticket.task_id, |_| async move {
                let _ = rx.await;
            })
            .unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), async {
            while manager.active_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("worker should complete its task");

        let task = manager.get_task(&ticket.task_id).unwrap();
        assert_eq!(task.state, TaskState::Completed);
        assert!(task.completed_at.is_some());
        // Completion frees the slot; retiring afterwards keeps the state
        assert!(manager.launch(ChannelId(2), &channel()).is_ok());
        manager.retire(&ticket);
        assert_eq!(
            manager.get_task(&ticket.task_id).unwrap().state,
            TaskState::Completed
        );
    }

    #[tokio::test]
    async fn test_remove_task_aborts_stubborn_worker() {
        let manager = TaskManager::new();
        let (task_id, _) = manager.register_task("Stubborn").unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        manager
            .spawn_worker(&task_id, |_| async move {
                let _tx = tx;
                std::future::pending::<()>().await;
            })
            .unwrap();
        tokio::task::yield_now().await;

        manager.cancel(&task_id).unwrap();
        assert!(manager.remove_task(&task_id).is_some());
        // Aborting drops the worker future and with it the sender
        let result = tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("worker should be aborted");
        assert!(result.is_err());
        assert_eq!(manager.total_count(), 0);
    }

    #[test]
    fn test_cleanup_completed_tasks() {
        let manager = TaskManager::new();

        for i in 0..(MAX_COMPLETED_TASKS + 10) {
            let (task_id, _) = manager.register_task(format!("Task {}", i)).unwrap();
            manager.cancel(&task_id).unwrap();
        }

        assert!(manager.total_count() > MAX_COMPLETED_TASKS);
        manager.cleanup_completed_tasks();
        assert_eq!(manager.total_count(), MAX_COMPLETED_TASKS);
    }
}
