use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use api::ChatMessage;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::{
    job::{Job, JobId, JobOutcome, JobStatus},
    JobQueue, QueueError,
};

#[derive(Default)]
struct State {
    jobs: HashMap<JobId, Job>,
    // Per-channel FIFO of ids still in `queued`.
    ready: HashMap<String, VecDeque<JobId>>,
}

/// In-process queue with the same contract as [`crate::PgQueue`], used
/// in tests and single-process deployments. Claim exclusivity comes
/// from the table mutex; durability and orphan reaping do not apply
/// since workers share the process with the queue.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    notify: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_claim(&self, channels: &[String]) -> Option<Job> {
        let mut state = self.inner.state.lock();
        for channel in channels {
            let Some(id) = state.ready.get_mut(channel).and_then(VecDeque::pop_front) else {
                continue;
            };
            let job = state.jobs.get_mut(&id).unwrap();
            job.status = JobStatus::Running;
            return Some(job.clone());
        }
        None
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(
        &self,
        channel: &str,
        payload: Vec<ChatMessage>,
    ) -> Result<JobId, QueueError> {
        let job = Job::new(channel, payload);
        let id = job.id;
        {
            let mut state = self.inner.state.lock();
            state.jobs.insert(id, job);
            state.ready.entry(channel.to_string()).or_default().push_back(id);
        }
        self.inner.notify.notify_one();
        Ok(id)
    }

    async fn fetch(&self, id: &JobId) -> Result<JobOutcome, QueueError> {
        let state = self.inner.state.lock();
        let Some(job) = state.jobs.get(id) else {
            return Err(QueueError::NotFound(*id));
        };
        Ok(match job.status {
            JobStatus::Finished => JobOutcome::Succeeded(job.result.clone().unwrap_or_default()),
            s if s.is_failure() => JobOutcome::Failed {
                status: s,
                detail: job
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            },
            s => JobOutcome::Pending(s),
        })
    }

    async fn dequeue(&self, channels: &[String]) -> Result<Job, QueueError> {
        loop {
            // Register before checking so an enqueue between the check
            // and the await is not lost.
            let notified = self.inner.notify.notified();
            if let Some(job) = self.try_claim(channels) {
                return Ok(job);
            }
            notified.await;
        }
    }

    async fn complete(&self, id: &JobId, result: String) -> Result<(), QueueError> {
        let mut state = self.inner.state.lock();
        match state.jobs.get_mut(id) {
            Some(job) if job.status == JobStatus::Running => {
                job.status = JobStatus::Finished;
                job.result = Some(result);
            }
            _ => tracing::warn!("job {id} already left running; result dropped"),
        }
        Ok(())
    }

    async fn fail(
        &self,
        id: &JobId,
        status: JobStatus,
        detail: String,
    ) -> Result<(), QueueError> {
        debug_assert!(status.is_failure());
        let mut state = self.inner.state.lock();
        match state.jobs.get_mut(id) {
            Some(job) if job.status == JobStatus::Running => {
                job.status = status;
                job.error = Some(detail);
            }
            _ => tracing::warn!("job {id} already left running; failure dropped"),
        }
        Ok(())
    }
}
