use mailparse::ParsedMail;
use secmail_domain::{MailMessage, SecureMailReference};
use secmail_error::SecMailError;

/// Name the portal gives the HTML notification part.
pub const SECURE_MAIL_ATTACHMENT: &str = "secure-email.html";

pub fn extract_secure_mail(message: &MailMessage) -> Result<SecureMailReference, SecMailError> {
    find_secure_mail_part(&message.body)
}

/// Scans the top-level parts of each multipart literal, in order, for the
/// named `text/html` part and returns its body transcoded to UTF-8 from the
/// declared charset.
pub fn find_secure_mail_part(literals: &[Vec<u8>]) -> Result<SecureMailReference, SecMailError> {
    for literal in literals {
        let parsed = mailparse::parse_mail(literal)
            .map_err(|e| SecMailError::parse(format!("mailparse: {e}")))?;

        for part in &parsed.subparts {
            if part.ctype.mimetype != "text/html" || !is_secure_mail_part(part) {
                continue;
            }
            let body = part
                .get_body()
                .map_err(|e| SecMailError::parse(format!("{SECURE_MAIL_ATTACHMENT} body: {e}")))?;
            return Ok(SecureMailReference::new(body));
        }
    }
    Err(SecMailError::not_found(format!(
        "mail has no \"{SECURE_MAIL_ATTACHMENT}\" attachment"
    )))
}

fn is_secure_mail_part(part: &ParsedMail<'_>) -> bool {
    if part
        .ctype
        .params
        .get("name")
        .is_some_and(|n| n == SECURE_MAIL_ATTACHMENT)
    {
        return true;
    }
    // Some clients only name the part in its disposition.
    part.get_content_disposition()
        .params
        .get("filename")
        .is_some_and(|n| n == SECURE_MAIL_ATTACHMENT)
}
