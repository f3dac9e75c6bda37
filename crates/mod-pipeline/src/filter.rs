use secmail_domain::MailMessage;

/// Accepts every message, or only those with a sender address ending in the
/// configured suffix (case-insensitive).
#[derive(Debug, Clone, Default)]
pub struct SenderFilter {
    suffix: Option<String>,
}

impl SenderFilter {
    pub fn new(suffix: Option<&str>) -> Self {
        let suffix = suffix
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);
        Self { suffix }
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    pub fn accepts(&self, message: &MailMessage) -> bool {
        let Some(suffix) = &self.suffix else {
            return true;
        };
        message
            .from
            .iter()
            .any(|address| address.to_lowercase().ends_with(suffix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from(addresses: &[&str]) -> MailMessage {
        MailMessage {
            id: "<1@test>".to_string(),
            from: addresses.iter().map(|a| a.to_string()).collect(),
            subject: "subject".to_string(),
            date: chrono::DateTime::<chrono::Utc>::default().fixed_offset(),
            body: Vec::new(),
        }
    }

    #[test]
    fn suffix_restricts_senders() {
        let filter = SenderFilter::new(Some("bar.com"));
        assert!(!filter.accepts(&from(&["x@foo.com"])));
        assert!(filter.accepts(&from(&["y@bar.com"])));
    }

    #[test]
    fn no_suffix_accepts_all() {
        for filter in [SenderFilter::new(None), SenderFilter::new(Some("  "))] {
            assert!(filter.accepts(&from(&["x@foo.com"])));
            assert!(filter.accepts(&from(&["y@bar.com"])));
            assert!(filter.accepts(&from(&[])));
        }
    }

    #[test]
    fn suffix_match_ignores_case() {
        let filter = SenderFilter::new(Some("@Bank.Example"));
        assert_eq!(filter.suffix(), Some("@bank.example"));
        assert!(filter.accepts(&from(&["Notify@BANK.example"])));
    }

    #[test]
    fn any_sender_may_match() {
        let filter = SenderFilter::new(Some("bar.com"));
        assert!(filter.accepts(&from(&["x@foo.com", "y@bar.com"])));
        assert!(!filter.accepts(&from(&[])));
    }
}
