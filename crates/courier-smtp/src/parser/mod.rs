//! SMTP response parser.
//!
//! Parsing is deliberately permissive: a line whose first three characters
//! are not digits yields code `0` instead of an error, and a reply cut short
//! by the end of the stream yields [`ReplyCode::NO_RESPONSE`]. Whether a code
//! is acceptable is decided by the caller comparing it with what it expected.

use crate::types::{Reply, ReplyCode};

/// Parses an SMTP reply from response lines.
///
/// SMTP replies can be single-line or multi-line:
/// - Single: `250 OK\r\n`
/// - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`
///
/// The code comes from the last line. If that line is still a continuation
/// line (the stream ended mid-reply) or there are no lines at all, the code
/// is [`ReplyCode::NO_RESPONSE`].
#[must_use]
pub fn parse_reply(lines: &[String]) -> Reply {
    let code = match lines.last() {
        Some(last) if is_last_reply_line(last) => parse_code(last),
        _ => ReplyCode::NO_RESPONSE,
    };

    let message = lines.iter().map(|line| reply_text(line)).collect();
    Reply::new(code, message)
}

/// Reads the status code from the first three characters of a line.
///
/// Leading digits are taken as the code; anything else yields `0`.
#[must_use]
pub fn parse_code(line: &str) -> ReplyCode {
    let digits: String = line
        .bytes()
        .take(3)
        .take_while(u8::is_ascii_digit)
        .map(char::from)
        .collect();
    ReplyCode::new(digits.parse().unwrap_or(0))
}

/// Returns the text of a reply line, i.e. everything after `"250-"`.
#[must_use]
pub fn reply_text(line: &str) -> String {
    line.as_bytes()
        .get(4..)
        .map(|rest| String::from_utf8_lossy(rest).into_owned())
        .unwrap_or_default()
}

/// Checks if a line is the last line of a multi-line reply.
///
/// Only a `-` in the fourth column marks a continuation; every other line,
/// including one shorter than four characters, ends the reply.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    line.as_bytes().get(3) != Some(&b'-')
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_parse_single_line_reply() {
        let reply = parse_reply(&lines(&["250 OK"]));
        assert_eq!(reply.code, ReplyCode::OK);
        assert_eq!(reply.message, vec!["OK"]);
    }

    #[test]
    fn test_parse_multi_line_reply() {
        let reply = parse_reply(&lines(&[
            "250-mx.example.com",
            "250-SIZE 1000",
            "250 STARTTLS",
        ]));
        assert_eq!(reply.code, ReplyCode::OK);
        assert_eq!(reply.text(), "mx.example.com\r\nSIZE 1000\r\nSTARTTLS");
    }

    #[test]
    fn test_code_taken_from_last_line() {
        let reply = parse_reply(&lines(&["250-first", "251 last"]));
        assert_eq!(reply.code, ReplyCode::FORWARD);
    }

    #[test]
    fn test_non_numeric_code_is_zero() {
        let reply = parse_reply(&lines(&["ABC OK"]));
        assert_eq!(reply.code, ReplyCode::new(0));
        assert_eq!(reply.text(), "OK");
    }

    #[test]
    fn test_partial_numeric_code() {
        assert_eq!(parse_code("25x hello"), ReplyCode::new(25));
        assert_eq!(parse_code(""), ReplyCode::new(0));
    }

    #[test]
    fn test_short_line_is_terminal() {
        assert!(is_last_reply_line("250"));
        assert!(is_last_reply_line(""));
        let reply = parse_reply(&lines(&["354"]));
        assert_eq!(reply.code, ReplyCode::START_DATA);
        assert_eq!(reply.message, vec![""]);
    }

    #[test]
    fn test_is_last_reply_line() {
        assert!(is_last_reply_line("250 OK"));
        assert!(!is_last_reply_line("250-Continuing"));
    }

    #[test]
    fn test_truncated_reply_has_no_response_code() {
        let reply = parse_reply(&lines(&["250-mx.example.com"]));
        assert_eq!(reply.code, ReplyCode::NO_RESPONSE);
        assert_eq!(reply.text(), "mx.example.com");
    }

    #[test]
    fn test_empty_reply() {
        let reply = parse_reply(&[]);
        assert_eq!(reply.code, ReplyCode::NO_RESPONSE);
        assert!(reply.message.is_empty());
    }

    proptest! {
        #[test]
        fn multi_line_reply_joins_fragments(
            code in 200i32..600,
            fragments in proptest::collection::vec("[ -~]{0,20}", 1..6),
        ) {
            let last = fragments.len() - 1;
            let raw: Vec<String> = fragments
                .iter()
                .enumerate()
                .map(|(i, text)| {
                    let sep = if i == last { ' ' } else { '-' };
                    format!("{code}{sep}{text}")
                })
                .collect();

            let reply = parse_reply(&raw);
            prop_assert_eq!(reply.code, ReplyCode::new(code));
            prop_assert_eq!(reply.text(), fragments.join("\r\n"));
        }
    }
}
