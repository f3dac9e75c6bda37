use std::fmt;

use async_trait::async_trait;
use secmail_domain::{ByteSink, OriginalFetcher, SecureMailReference};
use secmail_error::SecMailError;

use crate::client::VendorClient;
use crate::session::SecureMailSession;

#[derive(Clone)]
pub struct VendorCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for VendorCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VendorCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Runs a fresh portal session per notification over one shared client.
pub struct SecureMailDownloader {
    client: VendorClient,
    credentials: VendorCredentials,
}

impl SecureMailDownloader {
    pub fn new(client: VendorClient, credentials: VendorCredentials) -> Self {
        Self {
            client,
            credentials,
        }
    }
}

#[async_trait]
impl OriginalFetcher for SecureMailDownloader {
    async fn fetch_original(
        &self,
        reference: SecureMailReference,
        sink: &mut ByteSink,
    ) -> Result<u64, SecMailError> {
        let mut session = SecureMailSession::new(self.client.clone());
        session.open(reference).await?;
        session
            .login(&self.credentials.username, &self.credentials.password)
            .await?;
        session.download(sink).await
    }
}
