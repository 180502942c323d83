use std::fmt::Display;

use api::ChatMessage;
use postgres_types::{FromSql, ToSql};
use uuid::Uuid;

/// Identifier of a job, assigned once when the job is enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(pub Uuid);

impl JobId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl TryFrom<&str> for JobId {
    type Error = uuid::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Ok(JobId(Uuid::try_from(value)?))
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ToSql, FromSql)]
#[postgres(name = "job_state")]
pub enum JobStatus {
    #[postgres(name = "queued")]
    Queued,
    #[postgres(name = "running")]
    Running,
    #[postgres(name = "finished")]
    Finished,
    #[postgres(name = "failed")]
    Failed,
    #[postgres(name = "canceled")]
    Canceled,
    #[postgres(name = "stopped")]
    Stopped,
}

impl JobStatus {
    /// A terminal status admits no further transition.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Queued | JobStatus::Running)
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            JobStatus::Failed | JobStatus::Canceled | JobStatus::Stopped
        )
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
            JobStatus::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// One asynchronous completion request as handed to a worker.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub channel: String,
    pub payload: Vec<ChatMessage>,
    pub status: JobStatus,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl Job {
    pub(crate) fn new(channel: &str, payload: Vec<ChatMessage>) -> Self {
        Self {
            id: JobId::generate(),
            channel: channel.to_string(),
            payload,
            status: JobStatus::Queued,
            result: None,
            error: None,
        }
    }
}

/// What a polling client observes for a job id.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Still `queued` or `running`; poll again later.
    Pending(JobStatus),
    /// Finished, carrying the completion result.
    Succeeded(String),
    /// Ended in a failure-terminal status.
    Failed { status: JobStatus, detail: String },
}
