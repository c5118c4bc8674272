//! SMTP extension types.

use std::collections::HashMap;

use super::Reply;

/// Value attached to an advertised extension keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionValue {
    /// Keyword advertised on its own (e.g. `STARTTLS`).
    Flag,
    /// Keyword followed by an argument (e.g. `SIZE 1000000`).
    Argument(String),
}

/// Extensions advertised by the server in its EHLO reply.
///
/// Keys and arguments are stored upper-cased, so lookups such as
/// `supports("starttls")` and mechanism comparisons are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionSet {
    entries: HashMap<String, ExtensionValue>,
}

impl ExtensionSet {
    /// Creates an empty set (the result of a HELO negotiation).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the set from an EHLO reply, skipping the greeting line.
    #[must_use]
    pub fn from_ehlo(reply: &Reply) -> Self {
        reply.message.iter().skip(1).map(String::as_str).collect()
    }

    /// Parses one EHLO extension line and records it.
    pub fn insert_line(&mut self, line: &str) {
        let line = line.trim().to_uppercase();
        if line.is_empty() {
            return;
        }

        match line.split_once(' ') {
            Some((keyword, argument)) => {
                self.entries.insert(
                    keyword.to_string(),
                    ExtensionValue::Argument(argument.to_string()),
                );
            }
            None => {
                self.entries.insert(line, ExtensionValue::Flag);
            }
        }
    }

    /// Returns the value advertised for `keyword`, if any.
    #[must_use]
    pub fn get(&self, keyword: &str) -> Option<&ExtensionValue> {
        self.entries.get(&keyword.to_uppercase())
    }

    /// Checks if the server advertised `keyword`.
    #[must_use]
    pub fn supports(&self, keyword: &str) -> bool {
        self.get(keyword).is_some()
    }

    /// Returns the argument advertised with `keyword`, if any.
    #[must_use]
    pub fn argument(&self, keyword: &str) -> Option<&str> {
        match self.get(keyword)? {
            ExtensionValue::Argument(arg) => Some(arg.as_str()),
            ExtensionValue::Flag => None,
        }
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports("STARTTLS")
    }

    /// Returns the space-separated AUTH mechanism names, if AUTH was advertised.
    ///
    /// A bare `AUTH` keyword yields an empty list.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Option<Vec<&str>> {
        match self.get("AUTH")? {
            ExtensionValue::Argument(arg) => Some(arg.split(' ').filter(|m| !m.is_empty()).collect()),
            ExtensionValue::Flag => Some(Vec::new()),
        }
    }

    /// Returns the maximum message size, if a positive limit was advertised.
    ///
    /// `SIZE 0` means "no fixed limit" (RFC 1870) and yields `None`.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.argument("SIZE")
            .and_then(|arg| arg.split_whitespace().next())
            .and_then(|size| size.parse::<usize>().ok())
            .filter(|&size| size > 0)
    }

    /// Returns the number of advertised extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was advertised.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for ExtensionSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = Self::new();
        for line in iter {
            set.insert_line(line);
        }
        set
    }
}

/// SASL authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// DIGEST-MD5 - RFC 2831 digest challenge-response
    DigestMd5,
    /// CRAM-MD5 - HMAC challenge-response
    CramMd5,
    /// LOGIN - legacy plaintext
    Login,
    /// PLAIN - plaintext authentication
    Plain,
}

impl AuthMechanism {
    /// Mechanisms in order of preference, strongest first.
    pub const PRECEDENCE: [Self; 4] = [Self::DigestMd5, Self::CramMd5, Self::Login, Self::Plain];

    /// Parses an authentication mechanism name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DIGEST-MD5" => Some(Self::DigestMd5),
            "CRAM-MD5" => Some(Self::CramMd5),
            "LOGIN" => Some(Self::Login),
            "PLAIN" => Some(Self::Plain),
            _ => None,
        }
    }

    /// Returns the mechanism name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DigestMd5 => "DIGEST-MD5",
            Self::CramMd5 => "CRAM-MD5",
            Self::Login => "LOGIN",
            Self::Plain => "PLAIN",
        }
    }

    /// Picks the most preferred mechanism offered by the server.
    #[must_use]
    pub fn select(offered: &[&str]) -> Option<Self> {
        offered
            .iter()
            .filter_map(|name| Self::parse(name))
            .min_by_key(|mech| Self::PRECEDENCE.iter().position(|p| p == mech))
    }
}

impl std::fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::types::ReplyCode;

    mod extension_set_tests {
        use super::*;

        fn ehlo(lines: &[&str]) -> Reply {
            Reply::new(
                ReplyCode::OK,
                lines.iter().map(ToString::to_string).collect(),
            )
        }

        #[test]
        fn skips_greeting_line() {
            let set = ExtensionSet::from_ehlo(&ehlo(&["mx.example.com greets you"]));
            assert!(set.is_empty());
        }

        #[test]
        fn keyword_only_is_flag() {
            let set = ExtensionSet::from_ehlo(&ehlo(&["mx", "STARTTLS", "8BITMIME"]));
            assert_eq!(set.get("STARTTLS"), Some(&ExtensionValue::Flag));
            assert!(set.supports_starttls());
            assert_eq!(set.len(), 2);
        }

        #[test]
        fn argument_keeps_remainder() {
            let set = ExtensionSet::from_ehlo(&ehlo(&["mx", "AUTH PLAIN  LOGIN"]));
            assert_eq!(set.argument("AUTH"), Some("PLAIN  LOGIN"));
            assert_eq!(set.auth_mechanisms(), Some(vec!["PLAIN", "LOGIN"]));
        }

        #[test]
        fn lines_are_uppercased_and_trimmed() {
            let set = ExtensionSet::from_ehlo(&ehlo(&["mx", "  auth cram-md5 plain "]));
            assert_eq!(set.argument("auth"), Some("CRAM-MD5 PLAIN"));
        }

        #[test]
        fn bare_auth_has_no_mechanisms() {
            let set = ExtensionSet::from_ehlo(&ehlo(&["mx", "AUTH"]));
            assert_eq!(set.auth_mechanisms(), Some(vec![]));
        }

        #[test]
        fn missing_auth() {
            let set = ExtensionSet::from_ehlo(&ehlo(&["mx", "PIPELINING"]));
            assert_eq!(set.auth_mechanisms(), None);
        }

        #[test]
        fn size_limit() {
            let set = ExtensionSet::from_ehlo(&ehlo(&["mx", "SIZE 52428800"]));
            assert_eq!(set.max_message_size(), Some(52_428_800));
        }

        #[test]
        fn size_without_limit() {
            for line in ["SIZE", "SIZE 0", "SIZE lots"] {
                let set = ExtensionSet::from_ehlo(&ehlo(&["mx", line]));
                assert_eq!(set.max_message_size(), None, "{line}");
            }
        }
    }

    mod auth_mechanism_tests {
        use super::*;

        #[test]
        fn parse_names() {
            assert_eq!(AuthMechanism::parse("digest-md5"), Some(AuthMechanism::DigestMd5));
            assert_eq!(AuthMechanism::parse("CRAM-MD5"), Some(AuthMechanism::CramMd5));
            assert_eq!(AuthMechanism::parse("LOGIN"), Some(AuthMechanism::Login));
            assert_eq!(AuthMechanism::parse("plain"), Some(AuthMechanism::Plain));
            assert_eq!(AuthMechanism::parse("XOAUTH2"), None);
        }

        #[test]
        fn select_prefers_cram_over_login_and_plain() {
            assert_eq!(
                AuthMechanism::select(&["CRAM-MD5", "LOGIN", "PLAIN"]),
                Some(AuthMechanism::CramMd5)
            );
            assert_eq!(
                AuthMechanism::select(&["PLAIN", "LOGIN", "CRAM-MD5"]),
                Some(AuthMechanism::CramMd5)
            );
        }

        #[test]
        fn select_digest_first() {
            assert_eq!(
                AuthMechanism::select(&["PLAIN", "DIGEST-MD5", "CRAM-MD5"]),
                Some(AuthMechanism::DigestMd5)
            );
        }

        #[test]
        fn select_login_over_plain() {
            assert_eq!(
                AuthMechanism::select(&["LOGIN", "PLAIN"]),
                Some(AuthMechanism::Login)
            );
        }

        #[test]
        fn select_plain_alone() {
            assert_eq!(AuthMechanism::select(&["PLAIN"]), Some(AuthMechanism::Plain));
        }

        #[test]
        fn select_nothing_known() {
            assert_eq!(AuthMechanism::select(&["XOAUTH2"]), None);
            assert_eq!(AuthMechanism::select(&[]), None);
        }

        #[test]
        fn select_skips_unknown_and_ignores_case() {
            assert_eq!(
                AuthMechanism::select(&["XOAUTH2", "gssapi", "login", "plain"]),
                Some(AuthMechanism::Login)
            );
        }
    }
}
