use std::{sync::Arc, time::Duration};

use api::ChatMessage;
use async_trait::async_trait;
use postgres_types::Json;
use tokio_postgres::{Client, NoTls};

use crate::{
    job::{Job, JobId, JobOutcome, JobStatus},
    JobQueue, QueueError,
};

/// Default for how long a claimed job may stay `running` before it is
/// considered orphaned and reaped into `stopped`. Workers override it
/// through [`PgQueue::with_lease`] so the lease tracks their execution
/// time limit.
const DEFAULT_LEASE: Duration = Duration::from_secs(180);

/// How long terminal jobs stay fetchable before they are purged.
const RETENTION: Duration = Duration::from_secs(600);

/// Pause between claim attempts while the listened channels are empty.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

const SCHEMA: &str = "
    DO $$ BEGIN
        CREATE TYPE job_state AS ENUM
            ('queued', 'running', 'finished', 'failed', 'canceled', 'stopped');
    EXCEPTION WHEN duplicate_object THEN NULL;
    END $$;
    CREATE TABLE IF NOT EXISTS job (
        id uuid PRIMARY KEY,
        seq bigserial,
        channel text NOT NULL,
        state job_state NOT NULL,
        payload jsonb NOT NULL,
        result text,
        error text,
        lease_expires_at timestamptz,
        ended_at timestamptz
    );
    CREATE INDEX IF NOT EXISTS job_claim_idx ON job (channel, seq)
        WHERE state = 'queued';
";

/// Postgres-backed queue. All gateway and worker processes sharing one
/// database see the same jobs; claim exclusivity comes from
/// `FOR UPDATE SKIP LOCKED`.
#[derive(Clone)]
pub struct PgQueue {
    client: Arc<Client>,
    lease: Duration,
}

impl PgQueue {
    /// Connects to the broker database and ensures the job schema
    /// exists.
    pub async fn connect(conn_str: &str) -> Result<Self, QueueError> {
        let (client, connection) = tokio_postgres::connect(conn_str, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("broker connection error: {e}");
            }
        });
        client.batch_execute(SCHEMA).await?;
        Ok(Self {
            client: Arc::new(client),
            lease: DEFAULT_LEASE,
        })
    }

    /// Sets the lease attached to claims made through this handle. A
    /// worker must pass a lease longer than its execution time limit,
    /// or the reaper could stop jobs that are still healthy.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Claims the first queued job across `channels`, preferring
    /// earlier channels and submission order within a channel.
    async fn claim(&self, channels: &[String]) -> Result<Option<Job>, QueueError> {
        let rows = self
            .client
            .query(
                "UPDATE job
                 SET state = 'running',
                     lease_expires_at = now() + make_interval(secs => $2)
                 WHERE id = (
                     SELECT id FROM job
                     WHERE state = 'queued' AND channel = ANY($1)
                     ORDER BY array_position($1, channel), seq
                     LIMIT 1
                     FOR UPDATE SKIP LOCKED
                 )
                 RETURNING id, channel, payload",
                &[&channels, &self.lease.as_secs_f64()],
            )
            .await?;
        let Some(r) = rows.get(0) else {
            return Ok(None);
        };
        let Json(payload): Json<Vec<ChatMessage>> = r.get(2);
        Ok(Some(Job {
            id: JobId(r.get(0)),
            channel: r.get(1),
            payload,
            status: JobStatus::Running,
            result: None,
            error: None,
        }))
    }

    /// Moves `running` jobs whose lease has lapsed (worker crashed
    /// without reporting) into the `stopped` terminal state.
    async fn reap_expired(&self) -> Result<(), QueueError> {
        let n = self
            .client
            .execute(
                "UPDATE job
                 SET state = 'stopped',
                     error = 'worker lease expired',
                     ended_at = now(),
                     lease_expires_at = NULL
                 WHERE state = 'running' AND lease_expires_at < now()",
                &[],
            )
            .await?;
        if n > 0 {
            tracing::warn!("reaped {n} orphaned running job(s)");
        }
        Ok(())
    }

    /// Drops terminal jobs older than the retention window.
    async fn purge_expired(&self) -> Result<(), QueueError> {
        let n = self
            .client
            .execute(
                "DELETE FROM job
                 WHERE state IN ('finished', 'failed', 'canceled', 'stopped')
                   AND ended_at < now() - make_interval(secs => $1)",
                &[&RETENTION.as_secs_f64()],
            )
            .await?;
        if n > 0 {
            tracing::debug!("purged {n} expired job(s)");
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for PgQueue {
    async fn enqueue(
        &self,
        channel: &str,
        payload: Vec<ChatMessage>,
    ) -> Result<JobId, QueueError> {
        let id = JobId::generate();
        self.client
            .execute(
                "INSERT INTO job (id, channel, state, payload)
                 VALUES ($1, $2, 'queued', $3)",
                &[&id.0, &channel, &Json(&payload)],
            )
            .await?;
        tracing::debug!("enqueued job {id} on channel {channel}");
        Ok(id)
    }

    async fn fetch(&self, id: &JobId) -> Result<JobOutcome, QueueError> {
        let rows = self
            .client
            .query("SELECT state, result, error FROM job WHERE id = $1", &[&id.0])
            .await?;
        let Some(r) = rows.get(0) else {
            return Err(QueueError::NotFound(*id));
        };
        let status: JobStatus = r.get(0);
        Ok(match status {
            JobStatus::Finished => {
                JobOutcome::Succeeded(r.get::<_, Option<String>>(1).unwrap_or_default())
            }
            s if s.is_failure() => JobOutcome::Failed {
                status: s,
                detail: r
                    .get::<_, Option<String>>(2)
                    .unwrap_or_else(|| "unknown error".to_string()),
            },
            s => JobOutcome::Pending(s),
        })
    }

    async fn dequeue(&self, channels: &[String]) -> Result<Job, QueueError> {
        loop {
            self.reap_expired().await?;
            self.purge_expired().await?;
            if let Some(job) = self.claim(channels).await? {
                tracing::debug!("claimed job {} from channel {}", job.id, job.channel);
                return Ok(job);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn complete(&self, id: &JobId, result: String) -> Result<(), QueueError> {
        let n = self
            .client
            .execute(
                "UPDATE job
                 SET state = 'finished', result = $2,
                     ended_at = now(), lease_expires_at = NULL
                 WHERE id = $1 AND state = 'running'",
                &[&id.0, &result],
            )
            .await?;
        if n == 0 {
            tracing::warn!("job {id} already left running; result dropped");
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
        let n = self
            .client
            .execute(
                "UPDATE job
                 SET state = $2, error = $3,
                     ended_at = now(), lease_expires_at = NULL
                 WHERE id = $1 AND state = 'running'",
                &[&id.0, &status, &detail],
            )
            .await?;
        if n == 0 {
            tracing::warn!("job {id} already left running; failure dropped");
        }
        Ok(())
    }
}
