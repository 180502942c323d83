pub mod completion;

use std::time::Duration;

use queue::{Job, JobQueue, JobStatus, QueueError};
use tokio::{select, sync::watch, time::timeout};

pub use completion::{Completion, CompletionClient};

/// Lease to attach to this worker's claims: twice the execution time
/// limit, so a job still running at the limit reports its outcome well
/// before the reaper may take it.
pub fn claim_lease(time_limit: Duration) -> Duration {
    time_limit * 2
}

/// The worker loop: claims jobs from the queue, runs the completion
/// call and reports the outcome. A failing or overrunning call marks
/// only that job failed; the loop keeps going.
pub struct Runner<Q, C> {
    queue: Q,
    completion: C,
    channels: Vec<String>,
    /// Wall-clock limit on one completion call. Enforced with
    /// `tokio::time::timeout`, so it takes effect at await points; a
    /// completion future that never yields cannot be preempted.
    time_limit: Duration,
}

impl<Q, C> Runner<Q, C>
where
    Q: JobQueue + Send + Sync,
    C: Completion + Send + Sync,
{
    pub fn new(queue: Q, completion: C, channels: Vec<String>, time_limit: Duration) -> Self {
        Self {
            queue,
            completion,
            channels,
            time_limit,
        }
    }

    /// Runs until `shutdown` fires. A shutdown mid-execution moves the
    /// job in flight to `stopped` before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), QueueError> {
        tracing::info!("listening on channels {:?}", self.channels);
        while !*shutdown.borrow() {
            let job = select! {
                _ = shutdown.changed() => continue,
                job = self.queue.dequeue(&self.channels) => job?,
            };
            self.execute(job, &mut shutdown).await?;
        }
        tracing::info!("worker loop stopped");
        Ok(())
    }

    async fn execute(
        &self,
        job: Job,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), QueueError> {
        tracing::info!("executing job {}", job.id);
        select! {
            _ = shutdown.changed() => {
                tracing::info!("job {} stopped by shutdown", job.id);
                self.queue
                    .fail(&job.id, JobStatus::Stopped, "worker shutdown".to_string())
                    .await?;
            }
            outcome = timeout(self.time_limit, self.completion.complete(&job.payload)) => {
                match outcome {
                    Ok(Ok(result)) => {
                        tracing::info!("job {} finished", job.id);
                        self.queue.complete(&job.id, result).await?;
                    }
                    Ok(Err(e)) => {
                        tracing::error!("job {} failed: {e:#}", job.id);
                        self.queue
                            .fail(&job.id, JobStatus::Failed, format!("{e:#}"))
                            .await?;
                    }
                    Err(_) => {
                        tracing::error!("job {} exceeded the time limit", job.id);
                        self.queue
                            .fail(
                                &job.id,
                                JobStatus::Failed,
                                format!("exceeded time limit of {:?}", self.time_limit),
                            )
                            .await?;
                    }
                }
            }
        }
        Ok(())
    }
}
