use scraper::{Html, Selector};
use secmail_domain::FormPayload;
use secmail_error::SecMailError;

/// Where each portal page keeps the form that advances the session.
///
/// These paths mirror the portal's current markup exactly. There is no
/// fallback: a markup change surfaces as `FormNotFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormLocator {
    /// First form of the notification mail body.
    Open,
    /// Login form directly under the content container.
    Login,
    /// Form of the last item in the last pill navigation list.
    Download,
}

impl FormLocator {
    pub fn selector(self) -> &'static str {
        match self {
            Self::Open => "form",
            Self::Login => "#content > form",
            Self::Download => "#content > ul.nav.nav-pills:last-of-type > li:last-child > form",
        }
    }
}

const HIDDEN_INPUTS: &str = "input[type=hidden]";

fn selector(css: &'static str) -> Result<Selector, SecMailError> {
    Selector::parse(css).map_err(|e| SecMailError::internal(format!("selector '{css}': {e:?}")))
}

/// Collects the hidden inputs of the form `locator` points at.
///
/// Inputs without a name or value, or with an empty one, are left out; a
/// repeated name keeps the last value. Bytes that are not UTF-8 are replaced
/// rather than rejected.
pub fn extract_form(document: &[u8], locator: FormLocator) -> Result<FormPayload, SecMailError> {
    let html = String::from_utf8_lossy(document);
    if html.trim().is_empty() {
        return Err(SecMailError::document_parse("empty document"));
    }

    let form_sel = selector(locator.selector())?;
    let input_sel = selector(HIDDEN_INPUTS)?;

    let document = Html::parse_document(&html);
    let form = document
        .select(&form_sel)
        .next()
        .ok_or_else(|| SecMailError::form_not_found(locator.selector()))?;

    Ok(form
        .select(&input_sel)
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value")?;
            (!name.is_empty() && !value.is_empty()).then_some((name, value))
        })
        .collect())
}
