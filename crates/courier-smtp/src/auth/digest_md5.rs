//! DIGEST-MD5 (RFC 2831) challenge parsing and response generation.
//!
//! Only the `auth` quality of protection is implemented; integrity and
//! confidentiality layers are not.

use std::borrow::Cow;

use md5::{Digest, Md5};
use rand::Rng;

use super::to_hex;
use crate::error::{Error, Result};

/// Quality of protection this client negotiates.
pub const QOP_AUTH: &str = "auth";

/// Nonce count; SMTP never re-authenticates on a session, so it stays at 1.
pub const NONCE_COUNT: &str = "00000001";

const DEFAULT_MAXBUF: &str = "65536";

/// Server challenge (`digest-challenge` in RFC 2831 §2.1.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Realm, empty if the server sent none.
    pub realm: String,
    /// Server nonce.
    pub nonce: String,
    /// Comma-separated qop options.
    pub qop: String,
    /// Maximum buffer size, echoed back verbatim.
    pub maxbuf: String,
    /// Algorithm (normally `md5-sess`); only its presence is checked.
    pub algorithm: String,
}

impl Challenge {
    /// Parses a decoded challenge string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidChallenge`] if `nonce` or `algorithm` is
    /// missing or empty.
    pub fn parse(input: &str) -> Result<Self> {
        let mut realm = None;
        let mut nonce = None;
        let mut qop = None;
        let mut maxbuf = None;
        let mut algorithm = None;

        for (key, value) in parse_pairs(input) {
            let slot = match key.as_str() {
                "realm" => &mut realm,
                "nonce" => &mut nonce,
                "qop" => &mut qop,
                "maxbuf" => &mut maxbuf,
                "algorithm" => &mut algorithm,
                // opaque, domain, charset, cipher and anything unknown
                _ => continue,
            };
            *slot = Some(value);
        }

        let nonce = nonce
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::InvalidChallenge("missing nonce".into()))?;
        let algorithm = algorithm
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::InvalidChallenge("missing algorithm".into()))?;

        Ok(Self {
            realm: realm.unwrap_or_default(),
            nonce,
            qop: qop
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| QOP_AUTH.to_string()),
            maxbuf: maxbuf
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_MAXBUF.to_string()),
            algorithm,
        })
    }

    /// Returns true if `qop` is one of the offered options.
    #[must_use]
    pub fn offers_qop(&self, qop: &str) -> bool {
        self.qop.split(',').any(|option| option.trim() == qop)
    }
}

/// Inputs of the digest computation.
#[derive(Clone, Copy)]
pub struct DigestInput<'a> {
    /// Authentication identity.
    pub username: &'a str,
    /// Secret.
    pub password: &'a str,
    /// Realm from the challenge.
    pub realm: &'a str,
    /// Server nonce.
    pub nonce: &'a str,
    /// Client nonce.
    pub cnonce: &'a str,
    /// Nonce count.
    pub nc: &'a str,
    /// Quality of protection.
    pub qop: &'a str,
    /// `serv-type/host`, e.g. `smtp/mx.example.com`.
    pub digest_uri: &'a str,
}

impl DigestInput<'_> {
    /// Computes the `response` directive (lowercase hex).
    #[must_use]
    pub fn response(&self) -> String {
        let secret = Md5::digest(format!("{}:{}:{}", self.username, self.realm, self.password));

        let mut a1 = Md5::new();
        a1.update(secret);
        a1.update(format!(":{}:{}", self.nonce, self.cnonce));
        let ha1 = to_hex(&a1.finalize());

        let ha2 = to_hex(&Md5::digest(format!("AUTHENTICATE:{}", self.digest_uri)));

        let kd = format!(
            "{ha1}:{}:{}:{}:{}:{ha2}",
            self.nonce, self.nc, self.cnonce, self.qop
        );
        to_hex(&Md5::digest(kd))
    }
}

/// Builds the `digest-response` sent back to the server.
///
/// Pure apart from its inputs, so a fixed `cnonce` gives a reproducible result.
#[must_use]
pub fn build_response(
    username: &str,
    password: &str,
    challenge: &Challenge,
    cnonce: &str,
    digest_uri: &str,
) -> String {
    let response = DigestInput {
        username,
        password,
        realm: &challenge.realm,
        nonce: &challenge.nonce,
        cnonce,
        nc: NONCE_COUNT,
        qop: QOP_AUTH,
        digest_uri,
    }
    .response();

    [
        ("username", username),
        ("realm", challenge.realm.as_str()),
        ("nonce", challenge.nonce.as_str()),
        ("cnonce", cnonce),
        ("nc", NONCE_COUNT),
        ("qop", QOP_AUTH),
        ("digest-uri", digest_uri),
        ("response", response.as_str()),
        ("maxbuf", challenge.maxbuf.as_str()),
    ]
    .iter()
    .map(|(key, value)| format!("{key}=\"{}\"", escape_quoted(value)))
    .collect::<Vec<_>>()
    .join(",")
}

/// Generates a fresh client nonce from 128 random bits.
#[must_use]
pub fn generate_cnonce() -> String {
    let bytes: [u8; 16] = rand::thread_rng().r#gen();
    to_hex(&bytes)
}

/// Splits `key=value` / `key="value"` pairs; keys are lower-cased.
fn parse_pairs(input: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
        if rest.is_empty() {
            break;
        }

        let key_len = rest
            .find(|c: char| !(c.is_ascii_alphabetic() || c == '-'))
            .unwrap_or(rest.len());
        let (key, after) = rest.split_at(key_len);

        let Some(after) = after.strip_prefix('=').filter(|_| !key.is_empty()) else {
            // Not a pair; resume after the next comma.
            rest = after.find(',').map_or("", |i| &after[i + 1..]);
            continue;
        };

        let value = if let Some(quoted) = after.strip_prefix('"') {
            let (value, remainder) = read_quoted(quoted);
            rest = remainder;
            value
        } else {
            let end = after.find(',').unwrap_or(after.len());
            rest = &after[end..];
            after[..end].trim().to_string()
        };

        pairs.push((key.to_ascii_lowercase(), value));
    }

    pairs
}

/// Escapes `\` and `"` for use inside a quoted string.
fn escape_quoted(value: &str) -> Cow<'_, str> {
    if !value.contains(['\\', '"']) {
        return Cow::Borrowed(value);
    }

    let mut escaped = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        if c == '\\' || c == '"' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    Cow::Owned(escaped)
}

/// Reads a quoted string body up to its closing quote, undoing `\` escapes.
fn read_quoted(input: &str) -> (String, &str) {
    let mut value = String::new();
    let mut chars = input.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    value.push(escaped);
                }
            }
            '"' => return (value, &input[i + 1..]),
            _ => value.push(c),
        }
    }

    (value, "")
}
