use std::sync::Arc;

use async_trait::async_trait;
use postgres_types::Json;
use tokio_postgres::{Client, NoTls};

use super::{InsertOutcome, ParticipantRecord, Storage, StorageError};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS participant (
        id text PRIMARY KEY,
        record jsonb NOT NULL,
        saved_at timestamptz NOT NULL DEFAULT now()
    );
";

/// Document-store backend: one jsonb row per participant. The primary
/// key makes the database serialize duplicate inserts.
#[derive(Clone)]
pub struct PgStorage(Arc<Client>);

impl PgStorage {
    pub async fn connect(conn_str: &str) -> Result<Self, StorageError> {
        let (client, connection) = tokio_postgres::connect(conn_str, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("storage connection error: {e}");
            }
        });
        client.batch_execute(SCHEMA).await?;
        Ok(Self(Arc::new(client)))
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn insert(&self, record: ParticipantRecord) -> Result<InsertOutcome, StorageError> {
        let n = self
            .0
            .execute(
                "INSERT INTO participant (id, record) VALUES ($1, $2)
                 ON CONFLICT (id) DO NOTHING",
                &[&record.participant_id, &Json(&record)],
            )
            .await?;
        Ok(if n == 1 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::Duplicate
        })
    }

    async fn entry_exists(&self, participant_id: &str) -> Result<bool, StorageError> {
        let rows = self
            .0
            .query(
                "SELECT 1 FROM participant WHERE id = $1",
                &[&participant_id],
            )
            .await?;
        Ok(!rows.is_empty())
    }
}
