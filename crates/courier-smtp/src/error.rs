//! Error types for SMTP operations.

use std::io;

use crate::types::ReplyCode;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Dialing the server (or the implicit TLS handshake) failed.
    #[error("Failed to connect to {host}:{port}: {reason}")]
    Connect {
        /// Host that was dialed.
        host: String,
        /// Port that was dialed.
        port: u16,
        /// System error description.
        reason: String,
    },

    /// I/O error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// STARTTLS handshake failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Server replied with an unexpected status code.
    #[error("Unexpected reply to {stage}: {code} {message}")]
    Protocol {
        /// Step that was being performed (e.g. `"EHLO"`, `"RCPT TO"`).
        stage: &'static str,
        /// Reply code received.
        code: ReplyCode,
        /// Reply text received.
        message: String,
    },

    /// Server advertises AUTH but none of the supported mechanisms.
    #[error("No supported authentication mechanism in: {0}")]
    UnsupportedAuth(String),

    /// Server rejected the credentials (535).
    #[error("Authentication failed, invalid credentials: {code} {message}")]
    AuthenticationFailed {
        /// Reply code received.
        code: ReplyCode,
        /// Reply text received.
        message: String,
    },

    /// DIGEST-MD5 challenge could not be used.
    #[error("Invalid DIGEST-MD5 challenge: {0}")]
    InvalidChallenge(String),

    /// DIGEST-MD5 server does not offer `qop=auth`.
    #[error("Server does not support qop=auth (offered: {0})")]
    UnsupportedQop(String),

    /// Message exceeds the size advertised by the server.
    #[error("Message size exceeds server limit: {size} > {limit}")]
    MessageTooLarge {
        /// Payload size including the final CRLF.
        size: usize,
        /// Limit advertised via the SIZE extension.
        limit: usize,
    },

    /// Operation not allowed in the current session state.
    #[error("Invalid state for operation: {0}")]
    InvalidState(String),
}

impl Error {
    /// Creates a protocol error from the step name and offending reply.
    #[must_use]
    pub fn protocol(stage: &'static str, code: ReplyCode, message: impl Into<String>) -> Self {
        Self::Protocol {
            stage,
            code,
            message: message.into(),
        }
    }

    /// Returns the reply code carried by this error, if any.
    #[must_use]
    pub const fn reply_code(&self) -> Option<ReplyCode> {
        match self {
            Self::Protocol { code, .. } | Self::AuthenticationFailed { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if the server rejected the supplied credentials.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        match self.reply_code() {
            Some(code) => code.is_permanent(),
            None => false,
        }
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self.reply_code() {
            Some(code) => code.is_transient(),
            None => false,
        }
    }
}
