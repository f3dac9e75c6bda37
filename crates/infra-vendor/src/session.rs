use std::fmt;

use secmail_domain::{ByteSink, SecureMailReference};
use secmail_error::SecMailError;
use tracing::{debug, info};

use crate::client::{PortalResponse, VendorClient};
use crate::form::{extract_form, FormLocator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    Unopened,
    Opened,
    Authenticated,
    Terminal,
}

impl SessionStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unopened => "unopened",
            Self::Opened => "opened",
            Self::Authenticated => "authenticated",
            Self::Terminal => "terminal",
        }
    }
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last page the portal returned; each one is read exactly once.
enum SessionState {
    Unopened,
    Opened(Vec<u8>),
    Authenticated(Vec<u8>),
    Terminal,
}

/// One walk through the portal: open, login, download.
///
/// A step called out of order fails with `StateMismatch` and leaves the
/// session untouched. A step that fails for any other reason ends the
/// session in `Terminal`.
pub struct SecureMailSession {
    client: VendorClient,
    state: SessionState,
}

impl SecureMailSession {
    pub fn new(client: VendorClient) -> Self {
        Self {
            client,
            state: SessionState::Unopened,
        }
    }

    pub fn stage(&self) -> SessionStage {
        match self.state {
            SessionState::Unopened => SessionStage::Unopened,
            SessionState::Opened(_) => SessionStage::Opened,
            SessionState::Authenticated(_) => SessionStage::Authenticated,
            SessionState::Terminal => SessionStage::Terminal,
        }
    }

    fn advance_from(&mut self, expected: SessionStage) -> Result<Vec<u8>, SecMailError> {
        let actual = self.stage();
        if actual != expected {
            return Err(SecMailError::StateMismatch {
                expected: expected.as_str(),
                actual: actual.as_str(),
            });
        }
        Ok(
            match std::mem::replace(&mut self.state, SessionState::Terminal) {
                SessionState::Opened(page) | SessionState::Authenticated(page) => page,
                SessionState::Unopened | SessionState::Terminal => Vec::new(),
            },
        )
    }

    async fn submit(
        &self,
        page: &[u8],
        locator: FormLocator,
        fields: &[(&str, &str)],
    ) -> Result<PortalResponse, SecMailError> {
        let mut form = extract_form(page, locator)?;
        for (name, value) in fields {
            form.set(*name, *value);
        }
        self.client.post_form(&form).await
    }

    /// Submits the notification's form and lands on the portal login page.
    pub async fn open(&mut self, reference: SecureMailReference) -> Result<(), SecMailError> {
        self.advance_from(SessionStage::Unopened)?;
        let page = async {
            self.submit(reference.as_bytes(), FormLocator::Open, &[])
                .await?
                .into_document()
                .await
        }
        .await
        .map_err(SecMailError::session)?;

        debug!(bytes = page.len(), "secure mail opened");
        self.state = SessionState::Opened(page);
        Ok(())
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), SecMailError> {
        let login_page = self.advance_from(SessionStage::Opened)?;
        let page = async {
            self.submit(
                &login_page,
                FormLocator::Login,
                &[("email", username), ("password", password)],
            )
            .await?
            .into_document()
            .await
        }
        .await
        .map_err(SecMailError::auth)?;

        debug!(bytes = page.len(), "secure mail login accepted");
        self.state = SessionState::Authenticated(page);
        Ok(())
    }

    /// Requests the raw original and streams it into `sink`.
    pub async fn download(&mut self, sink: &mut ByteSink) -> Result<u64, SecMailError> {
        let mail_page = self.advance_from(SessionStage::Authenticated)?;
        let written = async {
            self.submit(&mail_page, FormLocator::Download, &[("access", "raw")])
                .await?
                .stream_to(sink)
                .await
        }
        .await
        .map_err(SecMailError::download)?;

        info!(bytes = written, "secure mail downloaded");
        Ok(written)
    }
}
