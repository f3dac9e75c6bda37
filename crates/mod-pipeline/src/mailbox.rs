use std::sync::{Arc, Mutex, PoisonError};

use secmail_domain::{MailAccount, MailConnector, MailMessage, MailTransport, SeqRange};
use secmail_error::SecMailError;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Messages fetched per round trip.
pub const FETCH_BATCH: u32 = 25;
/// Bounded buffer between the fetch stage and the filter stage, and between
/// the filter stage and the consumer.
pub const QUEUE_CAPACITY: usize = 10;

type Shared<T> = Arc<Mutex<T>>;

/// Mail store session with a sticky first error.
///
/// Once an operation fails, every later operation returns without I/O.
/// Callers drain the message stream and then check [`MailboxPipeline::error`].
pub struct MailboxPipeline<T: MailTransport> {
    transport: Option<Shared<T>>,
    error: Shared<Option<SecMailError>>,
}

impl<T: MailTransport> MailboxPipeline<T> {
    pub async fn connect<C>(connector: Arc<C>, account: MailAccount) -> Self
    where
        C: MailConnector<Transport = T>,
    {
        let host = account.host.clone();
        let error = Arc::new(Mutex::new(None));
        let connected = tokio::task::spawn_blocking(move || connector.connect(&account))
            .await
            .map_err(|e| SecMailError::internal(format!("connect task: {e}")))
            .and_then(|result| result);

        let transport = match connected {
            Ok(transport) => {
                info!(host = %host, "connected to mail server");
                Some(Arc::new(Mutex::new(transport)))
            }
            Err(e) => {
                record(&error, e);
                None
            }
        };
        Self { transport, error }
    }

    pub fn error(&self) -> Option<SecMailError> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn failed(&self) -> bool {
        failed(&self.error)
    }

    pub async fn list_mailboxes(&self) -> Vec<String> {
        let names = self
            .blocking(|transport| transport.list_mailboxes())
            .await
            .unwrap_or_default();
        for name in &names {
            info!(mailbox = %name, "mailbox");
        }
        names
    }

    /// Selects `folder` and returns its message count.
    pub async fn select_folder(&self, folder: &str) -> Option<u32> {
        let name = folder.to_string();
        let count = self
            .blocking(move |transport| transport.select(&name))
            .await?;
        info!(folder, messages = count, "folder selected");
        Some(count)
    }

    /// Streams the messages in `range` that satisfy `predicate`, in the order
    /// the transport returns them.
    ///
    /// A fetch error ends the stream early and is recorded; messages already
    /// queued are still delivered.
    pub fn fetch_range<P>(&self, range: SeqRange, predicate: P) -> mpsc::Receiver<MailMessage>
    where
        P: Fn(&MailMessage) -> bool + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let Some(transport) = self.live_transport() else {
            return rx;
        };

        let (raw_tx, mut raw_rx) = mpsc::channel::<MailMessage>(QUEUE_CAPACITY);
        let error = Arc::clone(&self.error);
        tokio::task::spawn_blocking(move || {
            for batch in range.batches(FETCH_BATCH) {
                if failed(&error) {
                    return;
                }
                let fetched = transport
                    .lock()
                    .map_err(|_| SecMailError::internal("mail transport lock poisoned"))
                    .and_then(|mut transport| transport.fetch(batch));
                let messages = match fetched {
                    Ok(messages) => messages,
                    Err(e) => {
                        record(&error, e);
                        return;
                    }
                };
                debug!(range = %batch, fetched = messages.len(), "batch fetched");
                for message in messages {
                    if raw_tx.blocking_send(message).is_err() {
                        return;
                    }
                }
            }
        });

        tokio::spawn(async move {
            while let Some(message) = raw_rx.recv().await {
                if !predicate(&message) {
                    debug!(message_id = %message.id, "message rejected by filter");
                    continue;
                }
                if tx.send(message).await.is_err() {
                    break;
                }
            }
        });

        rx
    }

    /// Selects `folder` and streams every message in it through `predicate`.
    pub async fn filter_messages<P>(&self, folder: &str, predicate: P) -> mpsc::Receiver<MailMessage>
    where
        P: Fn(&MailMessage) -> bool + Send + 'static,
    {
        match self.select_folder(folder).await.and_then(SeqRange::all) {
            Some(range) => self.fetch_range(range, predicate),
            None => mpsc::channel(1).1,
        }
    }

    pub async fn close(&mut self) {
        if self.blocking(|transport| transport.logout()).await.is_some() {
            debug!("logged out");
        }
        self.transport = None;
    }

    fn live_transport(&self) -> Option<Shared<T>> {
        if self.failed() {
            return None;
        }
        self.transport.clone()
    }

    async fn blocking<R, F>(&self, op: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut T) -> Result<R, SecMailError> + Send + 'static,
    {
        let transport = self.live_transport()?;
        let result = tokio::task::spawn_blocking(move || {
            let mut transport = transport
                .lock()
                .map_err(|_| SecMailError::internal("mail transport lock poisoned"))?;
            op(&mut transport)
        })
        .await
        .map_err(|e| SecMailError::internal(format!("mail transport task: {e}")))
        .and_then(|result| result);

        match result {
            Ok(value) => Some(value),
            Err(e) => {
                record(&self.error, e);
                None
            }
        }
    }
}

fn failed(slot: &Mutex<Option<SecMailError>>) -> bool {
    slot.lock().unwrap_or_else(PoisonError::into_inner).is_some()
}

fn record(slot: &Mutex<Option<SecMailError>>, e: SecMailError) {
    error!(code = e.code(), error = %e, "mailbox operation failed");
    let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_none() {
        *slot = Some(e);
    }
}
