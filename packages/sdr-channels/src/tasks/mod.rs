// Execution collaborator for admitted channels
//
// Every admitted channel is backed by a registered task:
// - Task registration with unique IDs and a bounded active-task capacity
// - Graceful cancellation via CancellationToken when the channel is released
// - Optional worker futures spawned against the task's token
// - Pruning of old terminal tasks

mod manager;
mod types;

pub use manager::TaskManager;
pub use types::{ChannelExecutor, TaskError, TaskInfo, TaskResult, TaskState, TaskTicket};

// Re-export CancellationToken for consumers driving their own workers
pub use tokio_util::sync::CancellationToken;
