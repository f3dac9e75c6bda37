use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use secmail_error::SecMailError;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Append-only record of message identifiers whose workflow completed.
///
/// The known set is read once by [`DedupLedger::load`]. [`DedupLedger::record`]
/// only appends to the file, so identifiers recorded during a run are not
/// seen by [`DedupLedger::contains`] until the next load.
#[derive(Debug)]
pub struct DedupLedger {
    path: PathBuf,
    known: HashSet<String>,
    append: Mutex<()>,
}

impl DedupLedger {
    /// Reads the log at `path`. A missing file is an empty ledger.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, SecMailError> {
        let path = path.into();
        let known = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no ledger yet");
                HashSet::new()
            }
            Err(e) => {
                return Err(SecMailError::io(format!(
                    "reading ledger {}: {e}",
                    path.display()
                )))
            }
        };

        info!(path = %path.display(), known = known.len(), "ledger loaded");
        Ok(Self {
            path,
            known,
            append: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.known.contains(id)
    }

    /// Appends `id` as one line and syncs it to disk before returning.
    /// Concurrent calls are serialized; nothing else waits on the lock.
    pub async fn record(&self, id: &str) -> Result<(), SecMailError> {
        if id.trim().is_empty() || id.contains(['\n', '\r']) {
            return Err(SecMailError::internal(format!(
                "message id {id:?} cannot be recorded"
            )));
        }
        let line = format!("{id}\n");

        let _guard = self.append.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| SecMailError::io(format!("opening ledger {}: {e}", self.path.display())))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        file.sync_data().await?;

        debug!(message_id = id, "recorded in ledger");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn missing_file_is_empty_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = DedupLedger::load(dir.path().join("db.txt")).await.unwrap();
        assert!(ledger.is_empty());
        assert!(!ledger.contains("<a@host>"));
    }

    #[tokio::test]
    async fn load_reads_one_id_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.txt");
        std::fs::write(&path, "<a@host>\n<b@host>\r\n\n<a@host>\n").unwrap();

        let ledger = DedupLedger::load(&path).await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger.contains("<a@host>"));
        assert!(ledger.contains("<b@host>"));
    }

    #[tokio::test]
    async fn record_appends_without_refreshing_known_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.txt");
        std::fs::write(&path, "<old@host>\n").unwrap();

        let ledger = DedupLedger::load(&path).await.unwrap();
        ledger.record("<new@host>").await.unwrap();
        ledger.record("<new@host>").await.unwrap();

        assert!(!ledger.contains("<new@host>"));
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "<old@host>\n<new@host>\n<new@host>\n");

        let reloaded = DedupLedger::load(&path).await.unwrap();
        assert!(reloaded.contains("<new@host>"));
    }

    #[tokio::test]
    async fn concurrent_records_keep_lines_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.txt");
        let ledger = Arc::new(DedupLedger::load(&path).await.unwrap());

        let mut tasks = Vec::new();
        for i in 0..32 {
            let ledger = Arc::clone(&ledger);
            tasks.push(tokio::spawn(async move {
                ledger.record(&format!("<{i}@host>")).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<&str> = contents.lines().collect();
        lines.sort_unstable();
        lines.dedup();
        assert_eq!(lines.len(), 32);
        assert!(contents.ends_with('\n'));
    }

    #[tokio::test]
    async fn rejects_ids_that_would_break_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = DedupLedger::load(dir.path().join("db.txt")).await.unwrap();
        assert!(ledger.record("").await.is_err());
        assert!(ledger.record("<a@host>\n<b@host>").await.is_err());
        assert!(!ledger.path().exists());
    }
}
