use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SecMailError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("mail parse error: {0}")]
    Parse(String),

    #[error("document parse error: {0}")]
    DocumentParse(String),

    #[error("form not found: {0}")]
    FormNotFound(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("cannot open secure mail: {0}")]
    Session(#[source] Box<SecMailError>),

    #[error("secure mail login failed: {0}")]
    Auth(#[source] Box<SecMailError>),

    #[error("cannot download mail: {0}")]
    Download(#[source] Box<SecMailError>),

    #[error("session is {actual}, expected {expected}")]
    StateMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("io error: {0}")]
    Io(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SecMailError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn document_parse(msg: impl Into<String>) -> Self {
        Self::DocumentParse(msg.into())
    }

    pub fn form_not_found(msg: impl Into<String>) -> Self {
        Self::FormNotFound(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    pub fn session(cause: SecMailError) -> Self {
        Self::Session(Box::new(cause))
    }

    pub fn auth(cause: SecMailError) -> Self {
        Self::Auth(Box::new(cause))
    }

    pub fn download(cause: SecMailError) -> Self {
        Self::Download(Box::new(cause))
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// How far an error reaches: the whole run, one message, or nothing.
    pub fn severity(&self) -> Severity {
        match self {
            Self::Transport(_) | Self::Config(_) => Severity::Fatal,
            Self::NotFound(_) => Severity::Skip,
            _ => Severity::Message,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Parse(_) => "PARSE_ERROR",
            Self::DocumentParse(_) => "DOCUMENT_PARSE_ERROR",
            Self::FormNotFound(_) => "FORM_NOT_FOUND",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Http(_) => "HTTP_ERROR",
            Self::Session(_) => "SESSION_ERROR",
            Self::Auth(_) => "AUTH_ERROR",
            Self::Download(_) => "DOWNLOAD_ERROR",
            Self::StateMismatch { .. } => "STATE_MISMATCH",
            Self::Io(_) => "IO_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<std::io::Error> for SecMailError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Halts the run once already-started work has drained.
    Fatal,
    /// Fails one message's workflow; it is retried on the next run.
    Message,
    /// Not a failure; the message simply carries no secure mail.
    Skip,
}

#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub code: &'static str,
    pub message: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<&'static str>,
}

impl From<&SecMailError> for ErrorReport {
    fn from(err: &SecMailError) -> Self {
        let suggestion = match err {
            SecMailError::Transport(_) => Some("Check IMAP_SERVER, IMAP_USERNAME and IMAP_PASSWORD"),
            SecMailError::Auth(_) => {
                Some("Check SECURE_MAIL_USERNAME and SECURE_MAIL_PASSWORD")
            }
            SecMailError::FormNotFound(_) => {
                Some("The secure mail portal markup may have changed")
            }
            SecMailError::Config(_) => Some("Set the required environment variables and restart"),
            _ => None,
        };
        Self {
            code: err.code(),
            message: err.to_string(),
            severity: err.severity(),
            suggestion,
        }
    }
}

impl ErrorReport {
    pub fn to_compact(&self) -> String {
        let mut parts = vec![format!("[{}] {}", self.code, self.message)];
        if let Some(s) = self.suggestion {
            parts.push(format!("Suggestion: {s}"));
        }
        parts.join(" | ")
    }
}
