//! DATA payload rendering.

use std::borrow::Cow;

use crate::types::Headers;

/// Renders headers, blank line, body and the terminating `.`.
///
/// `Bcc` is dropped from the headers. The returned string lacks the final
/// CRLF, which the line writer appends.
#[must_use]
pub fn render(headers: &Headers, body: &str) -> String {
    let mut headers = headers.clone();
    headers.remove("Bcc");

    let body = dot_stuff(body);
    let rendered = headers.render();

    let mut data = String::with_capacity(rendered.len() + body.len() + 5);
    data.push_str(&rendered);
    data.push_str("\r\n");
    data.push_str(&body);
    data.push_str("\r\n.");
    data
}

/// Doubles a leading `.` on every body line (RFC 5321 §4.5.2).
#[must_use]
pub fn dot_stuff(body: &str) -> Cow<'_, str> {
    if !body.starts_with('.') && !body.contains("\n.") {
        return Cow::Borrowed(body);
    }

    let mut out = String::with_capacity(body.len() + 8);
    for (i, line) in body.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
    }
    Cow::Owned(out)
}
