use std::fmt;

use chrono::{DateTime, FixedOffset};

/// One message as delivered by the mail transport.
///
/// `body` holds the literal sections returned by the fetch, usually a single
/// full RFC 822 message. `date` keeps the sender's UTC offset.
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub id: String,
    pub from: Vec<String>,
    pub subject: String,
    pub date: DateTime<FixedOffset>,
    pub body: Vec<Vec<u8>>,
}

impl fmt::Display for MailMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sender = self.from.first().map(String::as_str).unwrap_or("unknown");
        write!(f, "[{}] {sender}: {}", self.id, self.subject)
    }
}

/// The HTML notification body extracted from a message.
///
/// Handed to the secure mail session by value; the bytes are buffered so the
/// orchestrator can persist them before giving them up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureMailReference(Vec<u8>);

impl SecureMailReference {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Ordered form fields. Setting an existing name replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormPayload {
    fields: Vec<(String, String)>,
}

impl FormPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(field) => field.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn as_pairs(&self) -> &[(String, String)] {
        &self.fields
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormPayload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut payload = Self::new();
        for (name, value) in iter {
            payload.set(name, value);
        }
        payload
    }
}

/// Inclusive range of message sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqRange {
    pub start: u32,
    pub end: u32,
}

impl SeqRange {
    /// `1..=count`, or `None` for an empty folder.
    pub fn all(count: u32) -> Option<Self> {
        (count > 0).then_some(Self {
            start: 1,
            end: count,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn batches(self, size: u32) -> impl Iterator<Item = SeqRange> {
        let size = size.max(1);
        let end = self.end;
        let mut next = (!self.is_empty()).then_some(self.start);
        std::iter::from_fn(move || {
            let start = next?;
            let stop = start.saturating_add(size - 1).min(end);
            next = (stop < end).then(|| stop + 1);
            Some(SeqRange { start, end: stop })
        })
    }
}

impl fmt::Display for SeqRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}
