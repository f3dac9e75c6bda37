use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use secmail_domain::MailMessage;
use secmail_error::SecMailError;
use tokio::sync::Mutex;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H.%M.%S";
const MAX_SUBJECT_CHARS: usize = 120;
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Files written for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub html: PathBuf,
    pub original: PathBuf,
    /// Staging file the original is streamed into before the rename.
    pub partial: PathBuf,
}

/// Where the ledger and the per-message output files live.
///
/// Clones share the set of names claimed during this run.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
    claimed: Arc<Mutex<HashSet<String>>>,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            claimed: Arc::default(),
        }
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.root.join("db.txt")
    }

    pub fn mails_dir(&self) -> PathBuf {
        self.root.join("mails")
    }

    pub async fn ensure_dirs(&self) -> Result<(), SecMailError> {
        let dir = self.mails_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SecMailError::io(format!("creating {}: {e}", dir.display())))
    }

    /// Claims `<timestamp> <subject>` for `message`, or `<timestamp> <subject>-<n>`
    /// when an earlier unit of this run claimed the name or a file with it
    /// already exists.
    pub async fn claim_outputs(&self, message: &MailMessage) -> Result<OutputPaths, SecMailError> {
        let base = file_stem(message);
        let mut claimed = self.claimed.lock().await;

        for n in 1..=MAX_NAME_ATTEMPTS {
            let stem = if n == 1 {
                base.clone()
            } else {
                format!("{base}-{n}")
            };
            if claimed.contains(&stem) {
                continue;
            }
            let paths = self.outputs(&stem);
            if exists(&paths.html).await?
                || exists(&paths.original).await?
                || exists(&paths.partial).await?
            {
                continue;
            }
            claimed.insert(stem);
            return Ok(paths);
        }
        Err(SecMailError::io(format!("no free file name for \"{base}\"")))
    }

    fn outputs(&self, stem: &str) -> OutputPaths {
        let dir = self.mails_dir();
        OutputPaths {
            html: dir.join(format!("{stem}.html")),
            original: dir.join(format!("{stem}.eml")),
            partial: dir.join(format!("{stem}.eml.part")),
        }
    }
}

async fn exists(path: &Path) -> Result<bool, SecMailError> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| SecMailError::io(format!("checking {}: {e}", path.display())))
}

fn file_stem(message: &MailMessage) -> String {
    format!(
        "{} {}",
        message.date.format(TIMESTAMP_FORMAT),
        sanitize_filename(&message.subject)
    )
}

/// Makes a subject safe to use as a single path component.
pub fn sanitize_filename(subject: &str) -> String {
    let replaced: String = subject
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() && !c.is_whitespace() => '_',
            c => c,
        })
        .collect();

    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let capped: String = collapsed.chars().take(MAX_SUBJECT_CHARS).collect();
    let trimmed = capped.trim_end().trim_matches('.');

    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}
