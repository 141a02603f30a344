// Task types and the execution collaborator trait

use crate::types::{Channel, ChannelId};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Task already cancelled: {0}")]
    AlreadyCancelled(String),

    #[error("Task capacity exceeded: {active} of {capacity} tasks active")]
    CapacityExceeded { active: usize, capacity: usize },

    #[error("No async runtime available: {0}")]
    NoRuntime(String),
}

pub type TaskResult<T> = Result<T, TaskError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    /// The worker returned on its own
    Completed,
    Cancelled,
}

/// Bookkeeping for the task behind one admitted channel
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: String,
    pub name: String,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: TaskState::Running,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == TaskState::Running
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, TaskState::Completed | TaskState::Cancelled)
    }
}

pub(crate) struct TaskHandle {
    pub(crate) cancel_token: CancellationToken,
    pub(crate) join_handle: Option<JoinHandle<()>>,
}

impl TaskHandle {
    pub(crate) fn new(cancel_token: CancellationToken) -> Self {
        Self {
            cancel_token,
            join_handle: None,
        }
    }

    pub(crate) fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// What an admitted channel holds on to from the execution collaborator
#[derive(Debug, Clone)]
pub struct TaskTicket {
    pub task_id: String,
    pub cancel_token: CancellationToken,
}

/// Accepts the workload of admitted channels.
///
/// `launch` runs inside the allocator's critical section and must not block.
pub trait ChannelExecutor: Send + Sync {
    fn launch(&self, id: ChannelId, channel: &Channel) -> TaskResult<TaskTicket>;

    fn retire(&self, ticket: &TaskTicket);
}
