//! Message header set handed to the transport.

use std::fmt::Write;

/// Ordered header fields of an outgoing message.
///
/// The transport does not build headers; it only strips `Bcc` and renders
/// what the caller supplied. Names are matched case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header set.
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Appends a header, replacing any existing header with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(field) = self
            .fields
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            field.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Returns the value of a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Removes every header called `name`, returning true if one was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.fields.len();
        self.fields
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        self.fields.len() != before
    }

    /// Returns true if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Renders the headers as `Name: value\r\n` lines.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, value) in self.iter() {
            let _ = write!(out, "{name}: {value}\r\n");
        }
        out
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn render_keeps_order() {
        let headers = Headers::new()
            .with("From", "a@example.com")
            .with("To", "b@example.com")
            .with("Subject", "Hi");
        assert_eq!(
            headers.render(),
            "From: a@example.com\r\nTo: b@example.com\r\nSubject: Hi\r\n"
        );
    }

    #[test]
    fn insert_replaces_case_insensitively() {
        let mut headers = Headers::new().with("Subject", "one");
        headers.insert("subject", "two");
        assert_eq!(headers.get("SUBJECT"), Some("two"));
        assert_eq!(headers.iter().count(), 1);
    }

    #[test]
    fn remove_is_case_insensitive() {
        let mut headers: Headers = [("To", "a@x"), ("BCC", "hidden@x")].into_iter().collect();
        assert!(headers.remove("Bcc"));
        assert!(!headers.remove("Bcc"));
        assert_eq!(headers.render(), "To: a@x\r\n");
    }

    #[test]
    fn empty_renders_nothing() {
        assert_eq!(Headers::new().render(), "");
        assert!(Headers::default().is_empty());
    }
}
