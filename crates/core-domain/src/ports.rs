use std::fmt;

use async_trait::async_trait;
use secmail_error::SecMailError;
use tokio::io::AsyncWrite;

use crate::entities::{MailMessage, SecureMailReference, SeqRange};

#[derive(Clone)]
pub struct MailAccount {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for MailAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailAccount")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Opens authenticated sessions against a mail store. Blocking.
pub trait MailConnector: Send + Sync + 'static {
    type Transport: MailTransport;

    fn connect(&self, account: &MailAccount) -> Result<Self::Transport, SecMailError>;
}

/// An authenticated mail store session. Blocking; callers run it on the
/// blocking pool.
pub trait MailTransport: Send + 'static {
    fn list_mailboxes(&mut self) -> Result<Vec<String>, SecMailError>;

    /// Selects `folder` and returns its message count.
    fn select(&mut self, folder: &str) -> Result<u32, SecMailError>;

    /// Fetches envelope and full body for `range` of the selected folder, in
    /// the order the server returns them.
    fn fetch(&mut self, range: SeqRange) -> Result<Vec<MailMessage>, SecMailError>;

    fn logout(&mut self) -> Result<(), SecMailError>;
}

pub type ByteSink = dyn AsyncWrite + Send + Unpin;

/// Retrieves the original message behind a secure mail notification.
#[async_trait]
pub trait OriginalFetcher: Send + Sync {
    /// Streams the original into `sink` and returns the number of bytes written.
    async fn fetch_original(
        &self,
        reference: SecureMailReference,
        sink: &mut ByteSink,
    ) -> Result<u64, SecMailError>;
}
