//! The SMTP protocol engine.
//!
//! [`SmtpTransport`] runs one session: greeting, EHLO/HELO negotiation,
//! opportunistic STARTTLS, authentication, a single mail transaction and
//! QUIT. Construction fails fast, and a failed construction still sends QUIT
//! and closes the socket before the error is returned.
//!
//! ```text
//! Dialing ─→ Greeted ─→ Negotiated ─┬──────────────────────────────┬─→ ReadyToSend ─→ Sent ─→ Closed
//!                                   └─→ TlsRequested ─→ Negotiated ─┤
//!                                   └─→ Authenticating ─→ Authenticated
//! ```

pub mod payload;

use std::future::Future;

use crate::auth;
use crate::command::Command;
use crate::connection::{Config, Connection, Credentials, SmtpStream, Upgrade};
use crate::error::{Error, Result};
use crate::types::{AuthMechanism, ExtensionSet, Headers, Reply, ReplyCode};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Opening the socket.
    Dialing,
    /// Server greeted with 220.
    Greeted,
    /// EHLO or HELO accepted.
    Negotiated,
    /// STARTTLS issued, handshake pending.
    TlsRequested,
    /// AUTH exchange in progress.
    Authenticating,
    /// Server accepted the credentials.
    Authenticated,
    /// Session set up; a message may be sent.
    ReadyToSend,
    /// A message was accepted.
    Sent,
    /// QUIT sent and socket closed.
    Closed,
    /// A step failed; only teardown remains.
    Failed,
}

/// A way of handing one message to a mail system.
pub trait MailTransport: Send {
    /// Transmits a message to `recipients`.
    fn send(
        &mut self,
        from: &str,
        recipients: &[String],
        body: &str,
        headers: &Headers,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Ends the session. Never fails.
    fn close(self) -> impl Future<Output = ()> + Send
    where
        Self: Sized;
}

/// A message and its envelope.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    /// Envelope sender (`MAIL FROM`).
    pub from: String,
    /// Envelope recipients (`RCPT TO`), in order.
    pub recipients: Vec<String>,
    /// Message body, already encoded.
    pub body: String,
    /// Header fields; `Bcc` is never transmitted.
    pub headers: Headers,
}

/// SMTP session over a single connection.
///
/// Call [`quit`](Self::quit) (or [`MailTransport::close`]) when done.
/// Dropping the transport releases the socket without sending QUIT;
/// [`send_mail`] and [`deliver`] always close.
#[derive(Debug)]
pub struct SmtpTransport<S = SmtpStream> {
    connection: Connection<S>,
    extensions: ExtensionSet,
    mechanism: Option<AuthMechanism>,
    state: SessionState,
}

impl SmtpTransport<SmtpStream> {
    /// Connects to the configured server and sets the session up.
    ///
    /// # Errors
    ///
    /// Returns the first error met while connecting, negotiating or
    /// authenticating. See [`SmtpTransport::establish`].
    pub async fn connect(config: &Config) -> Result<Self> {
        tracing::debug!(host = %config.host, port = config.port, "Dialing");
        let connection = Connection::connect(
            &config.host,
            config.port,
            config.implicit_tls,
            config.connect_timeout,
        )
        .await?
        .with_io_timeout(config.io_timeout);

        Self::establish(connection, config).await
    }
}

impl<S: Upgrade> SmtpTransport<S> {
    /// Sets a session up over an already open connection.
    ///
    /// Reads the greeting, negotiates, upgrades with STARTTLS when possible
    /// and authenticates when credentials are configured.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] for any unexpected reply code
    /// - [`Error::Tls`] if the STARTTLS handshake fails
    /// - [`Error::UnsupportedAuth`] if AUTH lists no known mechanism
    /// - [`Error::AuthenticationFailed`] if the credentials are rejected
    /// - [`Error::Io`] if the connection fails
    pub async fn establish(connection: Connection<S>, config: &Config) -> Result<Self> {
        let mut transport = Self {
            connection,
            extensions: ExtensionSet::new(),
            mechanism: None,
            state: SessionState::Dialing,
        };

        match transport.handshake(config).await {
            Ok(()) => {
                transport.set_state(SessionState::ReadyToSend);
                Ok(transport)
            }
            Err(e) => {
                tracing::warn!(error = %e, "SMTP session setup failed");
                transport.set_state(SessionState::Failed);
                transport.quit().await;
                Err(e)
            }
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Extensions from the most recent negotiation.
    #[must_use]
    pub const fn extensions(&self) -> &ExtensionSet {
        &self.extensions
    }

    /// Mechanism used to authenticate, if any.
    #[must_use]
    pub const fn mechanism(&self) -> Option<AuthMechanism> {
        self.mechanism
    }

    /// Returns true if the session runs over TLS.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.connection.is_secure()
    }

    /// Runs one mail transaction.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if MAIL, any RCPT, DATA or the final reply is refused;
    ///   the first refused recipient aborts the transaction
    /// - [`Error::MessageTooLarge`] if the payload exceeds the advertised SIZE;
    ///   DATA is not sent in that case
    /// - [`Error::Io`] if the connection fails
    /// - [`Error::InvalidState`] unless the session is ready or the previous
    ///   message was accepted; nothing is written in that case
    pub async fn send(
        &mut self,
        from: &str,
        recipients: &[String],
        body: &str,
        headers: &Headers,
    ) -> Result<()> {
        if !matches!(self.state, SessionState::ReadyToSend | SessionState::Sent) {
            return Err(Error::InvalidState(format!(
                "cannot send a message in state {:?}",
                self.state
            )));
        }

        let result = self.transmit(from, recipients, body, headers).await;
        match &result {
            Ok(()) => self.set_state(SessionState::Sent),
            Err(e) => {
                tracing::warn!(error = %e, "Message not sent");
                self.set_state(SessionState::Failed);
            }
        }
        result
    }

    /// Sends QUIT and closes the socket, ignoring any failure.
    ///
    /// Only the first call has an effect.
    pub async fn quit(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        // The reply is not awaited: the session ends either way.
        tracing::debug!(cmd = ?Command::Quit, "C:");
        if let Err(e) = self.connection.write_line(&Command::Quit.to_line()).await {
            tracing::debug!(error = %e, "QUIT failed");
        }
        if let Err(e) = self.connection.close().await {
            tracing::debug!(error = %e, "Close failed");
        }

        self.set_state(SessionState::Closed);
    }

    async fn handshake(&mut self, config: &Config) -> Result<()> {
        let greeting = self.connection.read_reply().await?;
        expect(&greeting, &[ReplyCode::SERVICE_READY], "greeting")?;
        self.set_state(SessionState::Greeted);

        self.negotiate(&config.client_id).await?;

        if config.starttls
            && self.connection.tls_available()
            && self.extensions.supports_starttls()
            && !self.connection.is_secure()
        {
            self.starttls(&config.client_id).await?;
        }

        if let Some(credentials) = &config.credentials {
            self.authenticate(credentials).await?;
        }

        Ok(())
    }

    /// EHLO, falling back to a single HELO for servers that reject it.
    async fn negotiate(&mut self, client_id: &str) -> Result<()> {
        let reply = self
            .connection
            .command(&Command::Ehlo {
                hostname: client_id.to_string(),
            })
            .await?;

        self.extensions = if reply.is(ReplyCode::OK) {
            ExtensionSet::from_ehlo(&reply)
        } else {
            tracing::debug!(code = %reply.code, "EHLO rejected, trying HELO");
            let reply = self
                .connection
                .command(&Command::Helo {
                    hostname: client_id.to_string(),
                })
                .await?;
            expect(&reply, &[ReplyCode::OK], "HELO")?;
            ExtensionSet::new()
        };

        tracing::debug!(extensions = ?self.extensions, "Negotiated");
        self.set_state(SessionState::Negotiated);
        Ok(())
    }

    /// STARTTLS followed by the mandatory renegotiation.
    async fn starttls(&mut self, client_id: &str) -> Result<()> {
        self.set_state(SessionState::TlsRequested);

        let reply = self.connection.command(&Command::StartTls).await?;
        expect(&reply, &[ReplyCode::SERVICE_READY], "STARTTLS")?;

        self.connection.upgrade_to_tls().await?;
        self.negotiate(client_id).await
    }

    async fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        let Some(offered) = self.extensions.auth_mechanisms() else {
            tracing::debug!("Server does not advertise AUTH, skipping authentication");
            return Ok(());
        };

        let mechanism = AuthMechanism::select(&offered)
            .ok_or_else(|| Error::UnsupportedAuth(offered.join(" ")))?;

        self.set_state(SessionState::Authenticating);
        tracing::debug!(%mechanism, "Authenticating");

        let reply = auth::authenticate(&mut self.connection, mechanism, credentials).await?;
        match reply.code {
            ReplyCode::AUTH_SUCCESS => {
                tracing::info!(%mechanism, "Authenticated");
                self.mechanism = Some(mechanism);
                self.set_state(SessionState::Authenticated);
                Ok(())
            }
            ReplyCode::AUTH_FAILED => Err(Error::AuthenticationFailed {
                code: reply.code,
                message: reply.text(),
            }),
            code => Err(Error::protocol("AUTH", code, reply.text())),
        }
    }

    async fn transmit(
        &mut self,
        from: &str,
        recipients: &[String],
        body: &str,
        headers: &Headers,
    ) -> Result<()> {
        let reply = self
            .connection
            .command(&Command::MailFrom {
                from: from.to_string(),
            })
            .await?;
        expect(&reply, &[ReplyCode::OK], "MAIL FROM")?;

        for recipient in recipients {
            let reply = self
                .connection
                .command(&Command::RcptTo {
                    to: recipient.clone(),
                })
                .await?;
            expect(&reply, &[ReplyCode::OK, ReplyCode::FORWARD], "RCPT TO")?;
        }

        let data = payload::render(headers, body);
        if let Some(limit) = self.extensions.max_message_size() {
            let size = data.len() + 2;
            if size > limit {
                return Err(Error::MessageTooLarge { size, limit });
            }
        }

        let reply = self.connection.command(&Command::Data).await?;
        expect(&reply, &[ReplyCode::START_DATA], "DATA")?;

        tracing::debug!(bytes = data.len() + 2, "C: <message data>");
        self.connection.write_line(&data).await?;
        let reply = self.connection.read_reply().await?;
        expect(&reply, &[ReplyCode::OK], "end of data")?;

        tracing::info!(recipients = recipients.len(), "Message accepted");
        Ok(())
    }

    fn set_state(&mut self, state: SessionState) {
        tracing::trace!(from = ?self.state, to = ?state, "Session state");
        self.state = state;
    }
}

impl<S> Drop for SmtpTransport<S> {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            tracing::debug!(state = ?self.state, "SMTP transport dropped without QUIT");
        }
    }
}

impl<S: Upgrade> MailTransport for SmtpTransport<S> {
    async fn send(
        &mut self,
        from: &str,
        recipients: &[String],
        body: &str,
        headers: &Headers,
    ) -> Result<()> {
        Self::send(self, from, recipients, body, headers).await
    }

    async fn close(mut self) {
        self.quit().await;
    }
}

/// Sends `envelope` over `transport`, then closes it whatever the outcome.
///
/// # Errors
///
/// Returns the error from [`MailTransport::send`].
pub async fn deliver<T: MailTransport>(mut transport: T, envelope: &Envelope) -> Result<()> {
    let result = transport
        .send(
            &envelope.from,
            &envelope.recipients,
            &envelope.body,
            &envelope.headers,
        )
        .await;
    transport.close().await;
    result
}

/// Connects with `config`, sends `envelope` and closes the session.
///
/// # Errors
///
/// Returns the first error from connecting, setting up or sending.
pub async fn send_mail(config: &Config, envelope: &Envelope) -> Result<()> {
    let transport = SmtpTransport::connect(config).await?;
    deliver(transport, envelope).await
}

fn expect(reply: &Reply, accepted: &[ReplyCode], stage: &'static str) -> Result<()> {
    if accepted.contains(&reply.code) {
        Ok(())
    } else {
        Err(Error::protocol(stage, reply.code, reply.text()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn config() -> Config {
        Config::builder("mx.example.com")
            .client_id("client.example.com")
            .build()
    }

    #[test]
    fn expect_accepts_listed_codes() {
        let reply = Reply::new(ReplyCode::FORWARD, vec!["will forward".into()]);
        assert!(expect(&reply, &[ReplyCode::OK, ReplyCode::FORWARD], "RCPT TO").is_ok());

        let err = expect(&reply, &[ReplyCode::OK], "MAIL FROM").unwrap_err();
        assert!(matches!(err, Error::Protocol { stage: "MAIL FROM", .. }));
        assert_eq!(err.reply_code(), Some(ReplyCode::FORWARD));
    }

    #[tokio::test]
    async fn plain_session_then_quit() {
        let mock = Builder::new()
            .read(b"220 mx.example.com ready\r\n")
            .write(b"EHLO client.example.com\r\n")
            .read(b"250 mx.example.com\r\n")
            .write(b"QUIT\r\n")
            .build();
        let connection = Connection::new(mock, "mx.example.com", 25);

        let mut transport = SmtpTransport::establish(connection, &config()).await.unwrap();
        assert_eq!(transport.state(), SessionState::ReadyToSend);
        assert!(transport.extensions().is_empty());
        assert_eq!(transport.mechanism(), None);

        transport.quit().await;
        assert_eq!(transport.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn failed_greeting_still_quits() {
        let mock = Builder::new()
            .read(b"421 too busy\r\n")
            .write(b"QUIT\r\n")
            .build();
        let connection = Connection::new(mock, "mx.example.com", 25);

        let Err(err) = SmtpTransport::establish(connection, &config()).await else {
            panic!("greeting 421 must fail the session");
        };
        assert!(err.is_transient());
        assert_eq!(err.reply_code(), Some(ReplyCode::SERVICE_UNAVAILABLE));
    }
}
