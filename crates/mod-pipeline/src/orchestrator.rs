use std::path::Path;
use std::sync::Arc;

use secmail_domain::{MailMessage, OriginalFetcher, SecureMailReference};
use secmail_error::{SecMailError, Severity};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::extractor::{extract_secure_mail, SECURE_MAIL_ATTACHMENT};
use crate::ledger::DedupLedger;
use crate::storage::{OutputPaths, StorageLayout};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Already in the ledger when the run started.
    pub skipped: usize,
    pub processed: usize,
    pub without_secure_mail: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn started(&self) -> usize {
        self.processed + self.without_secure_mail + self.failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Processed,
    WithoutSecureMail,
    Failed,
}

/// Runs one workflow per accepted message, concurrently, and waits for all
/// of them.
#[derive(Clone)]
pub struct Orchestrator {
    ledger: Arc<DedupLedger>,
    storage: StorageLayout,
    fetcher: Option<Arc<dyn OriginalFetcher>>,
}

impl Orchestrator {
    /// Without a `fetcher` only the notification body is saved.
    pub fn new(
        ledger: Arc<DedupLedger>,
        storage: StorageLayout,
        fetcher: Option<Arc<dyn OriginalFetcher>>,
    ) -> Self {
        Self {
            ledger,
            storage,
            fetcher,
        }
    }

    pub async fn run(&self, mut messages: mpsc::Receiver<MailMessage>) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut units = JoinSet::new();

        while let Some(message) = messages.recv().await {
            if self.ledger.contains(&message.id) {
                info!(message_id = %message.id, subject = %message.subject, "Skipping message");
                summary.skipped += 1;
                continue;
            }
            let unit = self.clone();
            units.spawn(async move { unit.process(message).await });
        }

        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(Outcome::Processed) => summary.processed += 1,
                Ok(Outcome::WithoutSecureMail) => summary.without_secure_mail += 1,
                Ok(Outcome::Failed) => summary.failed += 1,
                Err(e) => {
                    error!(error = %e, "message task aborted");
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    async fn process(&self, message: MailMessage) -> Outcome {
        info!(message_id = %message.id, subject = %message.subject, "Processing message");
        match self.workflow(&message).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    message_id = %message.id,
                    subject = %message.subject,
                    code = e.code(),
                    error = %e,
                    "message failed"
                );
                Outcome::Failed
            }
        }
    }

    async fn workflow(&self, message: &MailMessage) -> Result<Outcome, SecMailError> {
        let reference = match extract_secure_mail(message) {
            Ok(reference) => reference,
            Err(e) if e.severity() == Severity::Skip => {
                info!(
                    message_id = %message.id,
                    "Mail has no {SECURE_MAIL_ATTACHMENT} attachment"
                );
                self.ledger.record(&message.id).await?;
                return Ok(Outcome::WithoutSecureMail);
            }
            Err(e) => return Err(e),
        };

        let outputs = self.storage.claim_outputs(message).await?;
        tokio::fs::write(&outputs.html, reference.as_bytes())
            .await
            .map_err(|e| SecMailError::io(format!("writing {}: {e}", outputs.html.display())))?;
        info!(path = %outputs.html.display(), bytes = reference.as_bytes().len(), "saved notification");

        if let Some(fetcher) = &self.fetcher {
            // A retry on the next run starts from a clean name.
            if let Err(e) = download(fetcher.as_ref(), &outputs, reference).await {
                discard(&outputs.html).await;
                return Err(e);
            }
        }

        self.ledger.record(&message.id).await?;
        Ok(Outcome::Processed)
    }
}

async fn download(
    fetcher: &dyn OriginalFetcher,
    outputs: &OutputPaths,
    reference: SecureMailReference,
) -> Result<(), SecMailError> {
    let OutputPaths {
        original, partial, ..
    } = outputs;
    info!(path = %original.display(), "Downloading to");

    let mut file = tokio::fs::File::create(partial)
        .await
        .map_err(|e| SecMailError::io(format!("creating {}: {e}", partial.display())))?;
    let streamed = async {
        let bytes = fetcher.fetch_original(reference, &mut file).await?;
        file.sync_all().await?;
        Ok::<_, SecMailError>(bytes)
    }
    .await;
    drop(file);

    let bytes = match streamed {
        Ok(bytes) => bytes,
        Err(e) => {
            discard(partial).await;
            return Err(e);
        }
    };

    tokio::fs::rename(partial, original)
        .await
        .map_err(|e| SecMailError::io(format!("renaming to {}: {e}", original.display())))?;
    info!(path = %original.display(), bytes, "downloaded original");
    Ok(())
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "could not remove unfinished output");
    }
}
