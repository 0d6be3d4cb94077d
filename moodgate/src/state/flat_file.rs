use super::{MoodEvent, MoodEventLog, StateStorageError};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Mood log kept as a JSON-lines file, one event per line.
///
/// Appends are serialised through an in-process lock. Lines that fail to
/// parse, including ones naming a mood outside the canonical set, are
/// skipped on read.
pub struct FlatFileMoodLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FlatFileMoodLog {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StateStorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                StateStorageError::StorageError(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MoodEventLog for FlatFileMoodLog {
    async fn append(&self, event: MoodEvent) -> Result<(), StateStorageError> {
        let mut line = serde_json::to_string(&event)
            .map_err(|e| StateStorageError::SerializationError(e.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                StateStorageError::StorageError(format!(
                    "Failed to open {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
        file.write_all(line.as_bytes()).await.map_err(|e| {
            StateStorageError::StorageError(format!("Failed to append mood event: {}", e))
        })?;
        file.flush().await.map_err(|e| {
            StateStorageError::StorageError(format!("Failed to flush mood log: {}", e))
        })?;

        debug!(user_id = %event.user_id, mood = %event.mood, path = %self.path.display(), "appended mood event");
        Ok(())
    }

    async fn events_since(
        &self,
        user_id: &str,
        since: Option<NaiveDateTime>,
    ) -> Result<Vec<MoodEvent>, StateStorageError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StateStorageError::StorageError(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let mut events = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<MoodEvent>(line) {
                Ok(event) => {
                    if event.user_id == user_id && since.map_or(true, |since| event.occurred_at >= since) {
                        events.push(event);
                    }
                }
                Err(e) => {
                    warn!(path = %self.path.display(), line = line_no + 1, error = %e, "skipping malformed mood log line");
                }
            }
        }

        events.sort_by_key(|e| e.occurred_at);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use common::mood::Mood;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = FlatFileMoodLog::open(dir.path().join("nested/moods.jsonl"))
            .await
            .unwrap();
        assert!(log.events_since("u1", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = FlatFileMoodLog::open(dir.path().join("moods.jsonl")).await.unwrap();

        log.append(MoodEvent::new("u1", Mood::Happy, at(1, 10))).await.unwrap();
        log.append(MoodEvent::new("u2", Mood::Sad, at(1, 11))).await.unwrap();
        log.append(MoodEvent::new("u1", Mood::Curious, at(2, 9))).await.unwrap();

        let events = log.events_since("u1", None).await.unwrap();
        assert_eq!(
            events,
            vec![
                MoodEvent::new("u1", Mood::Happy, at(1, 10)),
                MoodEvent::new("u1", Mood::Curious, at(2, 9)),
            ]
        );

        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert!(contents.contains("\"occurred_at\":\"2024-01-02 09:00:00\""));
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("moods.jsonl");
        std::fs::write(
            &path,
            concat!(
                "{\"user_id\":\"u1\",\"mood\":\"Mutlu\",\"occurred_at\":\"2024-01-01 10:00:00\"}\n",
                "not json\n",
                "\n",
                "{\"user_id\":\"u1\",\"mood\":\"Heyecanlı\",\"occurred_at\":\"2024-01-01 10:30:00\"}\n",
                "{\"user_id\":\"u1\",\"mood\":\"Yorgun\",\"occurred_at\":\"2024-01-01T11:00:00\"}\n",
                "{\"user_id\":\"u1\",\"mood\":\"Yorgun\",\"occurred_at\":\"2024-01-01 12:00:00\"}\n",
            ),
        )
        .unwrap();

        let log = FlatFileMoodLog::open(&path).await.unwrap();
        let moods: Vec<Mood> = log
            .events_since("u1", None)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.mood)
            .collect();
        assert_eq!(moods, vec![Mood::Happy, Mood::Tired]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_all_kept() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(FlatFileMoodLog::open(dir.path().join("moods.jsonl")).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..20u32 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                let user = format!("u{}", i % 4);
                log.append(MoodEvent::new(user, Mood::Angry, at(1, i % 24)))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut total = 0;
        for u in 0..4 {
            total += log.events_since(&format!("u{}", u), None).await.unwrap().len();
        }
        assert_eq!(total, 20);
    }
}
