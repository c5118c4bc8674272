//! SASL authentication over the SMTP AUTH command (RFC 4954).
//!
//! Each mechanism drives its exchange up to the server's final reply and
//! returns that reply; classifying 235/535 is left to the caller.

pub mod digest_md5;

use std::fmt::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use md5::Md5;

use crate::command::Command;
use crate::connection::{Connection, Credentials, Upgrade};
use crate::error::{Error, Result};
use crate::types::{AuthMechanism, Reply, ReplyCode};

type HmacMd5 = Hmac<Md5>;

/// Runs `mechanism` and returns the server's final reply.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if an intermediate step is not answered with
/// 334, [`Error::InvalidChallenge`]/[`Error::UnsupportedQop`] for unusable
/// DIGEST-MD5 challenges, or [`Error::Io`] on connection failure.
pub async fn authenticate<S: Upgrade>(
    conn: &mut Connection<S>,
    mechanism: AuthMechanism,
    credentials: &Credentials,
) -> Result<Reply> {
    match mechanism {
        AuthMechanism::DigestMd5 => auth_digest_md5(conn, credentials).await,
        AuthMechanism::CramMd5 => auth_cram_md5(conn, credentials).await,
        AuthMechanism::Login => auth_login(conn, credentials).await,
        AuthMechanism::Plain => auth_plain(conn, credentials).await,
    }
}

async fn auth_plain<S: Upgrade>(conn: &mut Connection<S>, creds: &Credentials) -> Result<Reply> {
    start(conn, AuthMechanism::Plain).await?;
    respond(conn, &plain_response(creds)).await
}

async fn auth_login<S: Upgrade>(conn: &mut Connection<S>, creds: &Credentials) -> Result<Reply> {
    start(conn, AuthMechanism::Login).await?;

    let reply = respond(conn, creds.username.as_bytes()).await?;
    expect_challenge(reply)?;

    respond(conn, creds.password.as_bytes()).await
}

async fn auth_cram_md5<S: Upgrade>(
    conn: &mut Connection<S>,
    creds: &Credentials,
) -> Result<Reply> {
    let challenge = decode_challenge(&start(conn, AuthMechanism::CramMd5).await?)?;
    let response = cram_md5_response(creds, &challenge)?;
    respond(conn, response.as_bytes()).await
}

async fn auth_digest_md5<S: Upgrade>(
    conn: &mut Connection<S>,
    creds: &Credentials,
) -> Result<Reply> {
    let decoded = decode_challenge(&start(conn, AuthMechanism::DigestMd5).await?)?;
    let challenge = digest_md5::Challenge::parse(&String::from_utf8_lossy(&decoded))?;
    if !challenge.offers_qop(digest_md5::QOP_AUTH) {
        return Err(Error::UnsupportedQop(challenge.qop));
    }

    let cnonce = digest_md5::generate_cnonce();
    let digest_uri = format!("smtp/{}", conn.host());
    let response = digest_md5::build_response(
        &creds.username,
        &creds.password,
        &challenge,
        &cnonce,
        &digest_uri,
    );

    let reply = respond(conn, response.as_bytes()).await?;
    expect_challenge(reply)?;

    // The rspauth step carries nothing for SMTP; an empty line finishes it.
    conn.command(&Command::AuthResponse(String::new())).await
}

/// Sends `AUTH <mechanism>` and requires a 334 challenge.
async fn start<S: Upgrade>(conn: &mut Connection<S>, mechanism: AuthMechanism) -> Result<Reply> {
    let reply = conn.command(&Command::Auth { mechanism }).await?;
    expect_challenge(reply)
}

/// Sends base64(`data`) as a challenge response.
async fn respond<S: Upgrade>(conn: &mut Connection<S>, data: &[u8]) -> Result<Reply> {
    conn.command(&Command::AuthResponse(STANDARD.encode(data)))
        .await
}

fn expect_challenge(reply: Reply) -> Result<Reply> {
    if reply.is(ReplyCode::AUTH_CONTINUE) {
        Ok(reply)
    } else {
        Err(Error::protocol("AUTH", reply.code, reply.text()))
    }
}

fn decode_challenge(reply: &Reply) -> Result<Vec<u8>> {
    STANDARD
        .decode(reply.text().trim())
        .map_err(|e| Error::InvalidChallenge(format!("challenge is not base64: {e}")))
}

/// PLAIN message (RFC 4616) with an empty authorization identity.
#[must_use]
pub fn plain_response(creds: &Credentials) -> Vec<u8> {
    let mut message = Vec::with_capacity(creds.username.len() + creds.password.len() + 2);
    message.push(0);
    message.extend_from_slice(creds.username.as_bytes());
    message.push(0);
    message.extend_from_slice(creds.password.as_bytes());
    message
}

/// CRAM-MD5 response: `username hex(HMAC-MD5(password, challenge))`.
///
/// # Errors
///
/// Returns [`Error::InvalidChallenge`] if the HMAC cannot be keyed.
pub fn cram_md5_response(creds: &Credentials, challenge: &[u8]) -> Result<String> {
    let mut mac = HmacMd5::new_from_slice(creds.password.as_bytes())
        .map_err(|e| Error::InvalidChallenge(e.to_string()))?;
    mac.update(challenge);
    let digest = to_hex(&mac.finalize().into_bytes());
    Ok(format!("{} {digest}", creds.username))
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}
