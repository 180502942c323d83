pub mod file;
pub mod pg;

use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};

use api::ChatMessage;
use async_trait::async_trait;

use crate::app::study::TaskRecord;

pub use file::FileStorage;
pub use pg::PgStorage;

/// Everything persisted for one participant. At most one record per
/// participant id is ever accepted.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ParticipantRecord {
    pub participant_id: String,
    pub messages: Vec<ChatMessage>,
    pub tasks: HashMap<String, TaskRecord>,
    pub condition: String,
    pub correct_answers: u64,
    pub total_questions: u64,
    pub saved_at_unix: u64,
}

impl ParticipantRecord {
    pub fn saved_now(mut self) -> Self {
        self.saved_at_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with this participant id already exists; the stored
    /// record is left untouched.
    Duplicate,
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] tokio_postgres::Error),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt storage file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Participant record store. Implementations must serialize `insert`
/// against `entry_exists` per participant id so that no two records for
/// one participant can ever be created.
#[async_trait]
pub trait Storage {
    async fn insert(&self, record: ParticipantRecord) -> Result<InsertOutcome, StorageError>;

    async fn entry_exists(&self, participant_id: &str) -> Result<bool, StorageError>;
}
