use chrono::{DateTime, FixedOffset, Utc};
use imap_proto::types::Address as ImapAddress;
use secmail_domain::{MailAccount, MailConnector, MailMessage, MailTransport, SeqRange};
use secmail_error::SecMailError;
use tracing::{debug, info, warn};

type ImapSession = imap::Session<native_tls::TlsStream<std::net::TcpStream>>;

/// Connects over implicit TLS and logs in with a plain LOGIN.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImapConnector;

impl MailConnector for ImapConnector {
    type Transport = ImapTransport;

    fn connect(&self, account: &MailAccount) -> Result<ImapTransport, SecMailError> {
        let tls = native_tls::TlsConnector::builder()
            .build()
            .map_err(|e| SecMailError::transport(format!("TLS init: {e}")))?;

        let client = imap::connect(
            (account.host.as_str(), account.port),
            account.host.as_str(),
            &tls,
        )
        .map_err(|e| SecMailError::transport(format!("IMAP connect: {e}")))?;

        let session = client
            .login(&account.username, &account.password)
            .map_err(|(e, _)| SecMailError::transport(format!("IMAP login: {e}")))?;

        info!(host = %account.host, port = account.port, "IMAP session established");
        Ok(ImapTransport {
            session,
            folder: None,
        })
    }
}

pub struct ImapTransport {
    session: ImapSession,
    folder: Option<String>,
}

impl MailTransport for ImapTransport {
    fn list_mailboxes(&mut self) -> Result<Vec<String>, SecMailError> {
        let names = self
            .session
            .list(Some(""), Some("*"))
            .map_err(|e| SecMailError::transport(format!("IMAP LIST: {e}")))?;
        Ok(names.iter().map(|n| n.name().to_string()).collect())
    }

    fn select(&mut self, folder: &str) -> Result<u32, SecMailError> {
        let mailbox = self
            .session
            .select(folder)
            .map_err(|e| SecMailError::transport(format!("IMAP SELECT '{folder}': {e}")))?;
        self.folder = Some(folder.to_string());
        debug!(folder, exists = mailbox.exists, "folder selected");
        Ok(mailbox.exists)
    }

    fn fetch(&mut self, range: SeqRange) -> Result<Vec<MailMessage>, SecMailError> {
        let folder = self
            .folder
            .clone()
            .ok_or_else(|| SecMailError::transport("IMAP FETCH without a selected folder"))?;

        let fetches = self
            .session
            .fetch(range.to_string(), "(UID ENVELOPE BODY.PEEK[])")
            .map_err(|e| SecMailError::transport(format!("IMAP FETCH {range}: {e}")))?;

        let mut ordered: Vec<&imap::types::Fetch> = fetches.iter().collect();
        ordered.sort_by_key(|f| f.message);

        Ok(ordered
            .into_iter()
            .filter_map(|f| fetch_to_message(f, &folder))
            .collect())
    }

    fn logout(&mut self) -> Result<(), SecMailError> {
        self.session
            .logout()
            .map_err(|e| SecMailError::transport(format!("IMAP LOGOUT: {e}")))
    }
}

fn decode_mime_str(raw: &[u8]) -> String {
    let raw_str = String::from_utf8_lossy(raw).to_string();
    if !raw_str.contains("=?") {
        return raw_str;
    }
    let fake = format!("X: {raw_str}");
    match mailparse::parse_header(fake.as_bytes()) {
        Ok((hdr, _)) => hdr.get_value(),
        Err(_) => raw_str,
    }
}

/// Bare `mailbox@host`; group syntax and nameless entries yield nothing.
fn address_of(addr: &ImapAddress) -> Option<String> {
    let mailbox = addr
        .mailbox
        .as_ref()
        .and_then(|m| std::str::from_utf8(m).ok())
        .filter(|m| !m.is_empty())?;
    let host = addr
        .host
        .as_ref()
        .and_then(|h| std::str::from_utf8(h).ok())
        .unwrap_or("");

    if host.is_empty() {
        Some(mailbox.to_string())
    } else {
        Some(format!("{mailbox}@{host}"))
    }
}

fn addrs_to_vec(addrs: &Option<Vec<ImapAddress>>) -> Vec<String> {
    addrs
        .as_ref()
        .map(|list| list.iter().filter_map(address_of).collect())
        .unwrap_or_default()
}

/// Keeps the sender's offset. Dates chrono rejects (obsolete zone names,
/// comments) go through mailparse and come out in UTC; unreadable ones are
/// the epoch.
fn parse_imap_date(bytes: Option<&[u8]>) -> DateTime<FixedOffset> {
    let Some(raw) = bytes.and_then(|b| std::str::from_utf8(b).ok()).map(str::trim) else {
        return DateTime::<Utc>::default().fixed_offset();
    };
    DateTime::parse_from_rfc2822(raw)
        .ok()
        .or_else(|| {
            mailparse::dateparse(raw)
                .ok()
                .and_then(|ts| DateTime::from_timestamp(ts, 0))
                .map(|utc| utc.fixed_offset())
        })
        .unwrap_or_else(|| DateTime::<Utc>::default().fixed_offset())
}

fn message_id_or_fallback(raw: Option<&[u8]>, folder: &str, uid: Option<u32>) -> String {
    let message_id = raw
        .and_then(|b| std::str::from_utf8(b).ok())
        .map(str::trim)
        .unwrap_or("");

    if message_id.is_empty() {
        format!("uid:{folder}:{}", uid.unwrap_or(0))
    } else {
        message_id.to_string()
    }
}

fn fetch_to_message(fetch: &imap::types::Fetch, folder: &str) -> Option<MailMessage> {
    let Some(envelope) = fetch.envelope() else {
        warn!(seq = fetch.message, folder, "fetch response without envelope");
        return None;
    };

    let id = message_id_or_fallback(envelope.message_id, folder, fetch.uid);

    let subject = envelope
        .subject
        .as_ref()
        .map(|b| decode_mime_str(b))
        .unwrap_or_default();

    let body = match fetch.body() {
        Some(raw) => vec![raw.to_vec()],
        None => {
            warn!(message_id = %id, "fetch response without body");
            Vec::new()
        }
    };

    Some(MailMessage {
        id,
        from: addrs_to_vec(&envelope.from),
        subject,
        date: parse_imap_date(envelope.date),
        body,
    })
}
