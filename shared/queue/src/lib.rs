pub mod job;
pub mod memory;
pub mod pg;

use api::ChatMessage;
use async_trait::async_trait;

pub use job::{Job, JobId, JobOutcome, JobStatus};
pub use memory::MemoryQueue;
pub use pg::PgQueue;

/// Channels a worker listens on when none are configured, drained in
/// this order.
pub const DEFAULT_CHANNELS: [&str; 3] = ["high", "default", "low"];

/// Channel the gateway submits to.
pub const DEFAULT_CHANNEL: &str = "default";

#[derive(thiserror::Error, Debug)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(#[from] tokio_postgres::Error),
    #[error("job {0} is not found")]
    NotFound(JobId),
}

/// Shared job store coordinating the gateway and the workers.
///
/// Implementations must guarantee that a job is handed to exactly one
/// `dequeue` caller, that status transitions are forward-only
/// (`queued -> running -> terminal`), and that per-channel submission
/// order is preserved.
#[async_trait]
pub trait JobQueue {
    /// Creates a job in state `queued` and returns its id without
    /// waiting for execution.
    async fn enqueue(&self, channel: &str, payload: Vec<ChatMessage>)
        -> Result<JobId, QueueError>;

    /// Reports the current outcome of a job. `NotFound` if the id is
    /// unknown or the job's retention window has passed.
    async fn fetch(&self, id: &JobId) -> Result<JobOutcome, QueueError>;

    /// Blocks until a job is available on one of `channels` (drained in
    /// the given order, FIFO within a channel), claims it exclusively
    /// and transitions it to `running`.
    async fn dequeue(&self, channels: &[String]) -> Result<Job, QueueError>;

    /// Records a successful result, moving the job to `finished`.
    /// Ignored if the job already left `running`.
    async fn complete(&self, id: &JobId, result: String) -> Result<(), QueueError>;

    /// Records a failure, moving the job to the given failure-terminal
    /// status. Ignored if the job already left `running`.
    async fn fail(&self, id: &JobId, status: JobStatus, detail: String)
        -> Result<(), QueueError>;
}
