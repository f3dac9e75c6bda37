use std::path::PathBuf;

use secmail_domain::MailAccount;
use secmail_error::SecMailError;
use secmail_vendor::{VendorConfig, VendorCredentials, DEFAULT_ENDPOINT};

pub const DEFAULT_IMAP_PORT: u16 = 993;
pub const DEFAULT_FOLDER: &str = "INBOX.Archive";
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;
pub const DEFAULT_STORAGE_DIR: &str = "storage";

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub account: MailAccount,
    pub folder: String,
    pub sender_suffix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SecureMailConfig {
    pub credentials: VendorCredentials,
    pub client: VendorConfig,
}

/// Reads a variable from the process environment. Empty values count as unset.
pub fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String, SecMailError> {
    var(name).ok_or_else(|| SecMailError::config(format!("{name} env var not set")))
}

pub fn load_mail_config(var: impl Fn(&str) -> Option<String>) -> Result<MailConfig, SecMailError> {
    let server = required(&var, "IMAP_SERVER")?;
    let (host, port) = parse_server(&server)?;
    let username = required(&var, "IMAP_USERNAME")?;
    let password = required(&var, "IMAP_PASSWORD")?;

    Ok(MailConfig {
        account: MailAccount {
            host,
            port,
            username,
            password,
        },
        folder: var("IMAP_FOLDER").unwrap_or_else(|| DEFAULT_FOLDER.to_string()),
        sender_suffix: var("MAIL_FROM_SUFFIX"),
    })
}

/// `None` when either portal credential is missing: downloads are disabled.
pub fn load_secure_mail_config(
    var: impl Fn(&str) -> Option<String>,
) -> Result<Option<SecureMailConfig>, SecMailError> {
    let (Some(username), Some(password)) = (
        var("SECURE_MAIL_USERNAME"),
        var("SECURE_MAIL_PASSWORD"),
    ) else {
        return Ok(None);
    };

    let max_connections = match var("SECURE_MAIL_MAX_CONNECTIONS") {
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => {
                return Err(SecMailError::config(format!(
                    "invalid SECURE_MAIL_MAX_CONNECTIONS: {raw}"
                )))
            }
        },
        None => DEFAULT_MAX_CONNECTIONS,
    };

    Ok(Some(SecureMailConfig {
        credentials: VendorCredentials { username, password },
        client: VendorConfig {
            endpoint: var("SECURE_MAIL_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            max_connections,
        },
    }))
}

pub fn load_storage_dir(var: impl Fn(&str) -> Option<String>) -> PathBuf {
    PathBuf::from(var("SECMAIL_STORAGE_DIR").unwrap_or_else(|| DEFAULT_STORAGE_DIR.to_string()))
}

fn parse_server(server: &str) -> Result<(String, u16), SecMailError> {
    let server = server.trim();
    let (host, port) = match server.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|e| SecMailError::config(format!("invalid IMAP_SERVER port {port:?}: {e}")))?;
            (host, port)
        }
        None => (server, DEFAULT_IMAP_PORT),
    };
    if host.is_empty() {
        return Err(SecMailError::config(format!("invalid IMAP_SERVER: {server}")));
    }
    Ok((host.to_string(), port))
}
