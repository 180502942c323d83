use std::{
    fs,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{InsertOutcome, ParticipantRecord, Storage, StorageError};

/// Local file backend: the whole record list lives in one JSON file,
/// rewritten on each insert. The mutex serializes insert against
/// existence checks; suitable for small single-instance studies.
pub struct FileStorage {
    path: PathBuf,
    records: Mutex<Vec<ParticipantRecord>>,
}

impl FileStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let records = match fs::read(&path) {
            Ok(buf) => serde_json::from_slice(&buf)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    fn persist(&self, records: &[ParticipantRecord]) -> Result<(), StorageError> {
        fs::write(&self.path, serde_json::to_vec_pretty(records)?)?;
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn insert(&self, record: ParticipantRecord) -> Result<InsertOutcome, StorageError> {
        let mut records = self.records.lock();
        if records
            .iter()
            .any(|r| r.participant_id == record.participant_id)
        {
            return Ok(InsertOutcome::Duplicate);
        }
        records.push(record);
        if let Err(e) = self.persist(&records) {
            // A record that never reached disk must not count as
            // participation, or a retry would be rejected as duplicate.
            records.pop();
            return Err(e);
        }
        Ok(InsertOutcome::Inserted)
    }

    async fn entry_exists(&self, participant_id: &str) -> Result<bool, StorageError> {
        Ok(self
            .records
            .lock()
            .iter()
            .any(|r| r.participant_id == participant_id))
    }
}

#[cfg(test)]
mod tests {
    use tokio::runtime::Runtime;

    use super::*;

    fn record(pid: &str, condition: &str) -> ParticipantRecord {
        ParticipantRecord {
            participant_id: pid.to_string(),
            messages: Vec::new(),
            tasks: Default::default(),
            condition: condition.to_string(),
            correct_answers: 0,
            total_questions: 0,
            saved_at_unix: 0,
        }
        .saved_now()
    }

    fn temp_store(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("participants-{}-{name}.json", std::process::id()))
    }

    #[test]
    fn duplicate_insert_keeps_first_record() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let path = temp_store("dup");
            let _ = fs::remove_file(&path);
            let storage = FileStorage::open(&path).unwrap();

            assert_eq!(
                storage.insert(record("p1", "control")).await.unwrap(),
                InsertOutcome::Inserted
            );
            assert_eq!(
                storage.insert(record("p1", "treatment")).await.unwrap(),
                InsertOutcome::Duplicate
            );

            // The stored record must still be the first one.
            let reopened = FileStorage::open(&path).unwrap();
            let records = reopened.records.lock();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].condition, "control");
            drop(records);
            let _ = fs::remove_file(&path);
        });
    }

    #[test]
    fn failed_write_leaves_store_unchanged() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            // Parent directory does not exist, so every persist fails.
            let path = std::env::temp_dir()
                .join(format!("no-such-dir-{}", std::process::id()))
                .join("participants.json");
            let storage = FileStorage::open(&path).unwrap();

            assert!(matches!(
                storage.insert(record("p3", "control")).await,
                Err(StorageError::Io(_))
            ));

            // The failed insert must not register as participation; a
            // retry attempts the write again instead of reporting a
            // duplicate.
            assert!(!storage.entry_exists("p3").await.unwrap());
            assert!(matches!(
                storage.insert(record("p3", "control")).await,
                Err(StorageError::Io(_))
            ));
            assert!(!path.exists());
        });
    }

    #[test]
    fn entry_exists_tracks_inserts() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let path = temp_store("exists");
            let _ = fs::remove_file(&path);
            let storage = FileStorage::open(&path).unwrap();

            assert!(!storage.entry_exists("p2").await.unwrap());
            storage.insert(record("p2", "control")).await.unwrap();
            assert!(storage.entry_exists("p2").await.unwrap());
            let _ = fs::remove_file(&path);
        });
    }
}
