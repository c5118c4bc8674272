//! Line-oriented transport over an SMTP stream.
//!
//! [`Connection`] owns the socket for the lifetime of one session. It writes
//! CRLF-terminated lines, reads lines and complete (possibly multi-line)
//! replies, upgrades the socket to TLS in place, and closes it exactly once.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::stream::{SmtpStream, Upgrade};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::Reply;

/// Line transport for one SMTP session.
#[derive(Debug)]
pub struct Connection<S = SmtpStream> {
    stream: Option<BufReader<S>>,
    host: String,
    port: u16,
    handshake_timeout: Option<Duration>,
    io_timeout: Option<Duration>,
}

impl Connection<SmtpStream> {
    /// Dials `host:port`, performing the TLS handshake immediately if
    /// `implicit_tls` is set. Both are bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] with the system error text on failure.
    pub async fn connect(
        host: &str,
        port: u16,
        implicit_tls: bool,
        timeout: Duration,
    ) -> Result<Self> {
        let connect_error = |reason: String| Error::Connect {
            host: host.to_string(),
            port,
            reason,
        };

        let stream = tokio::time::timeout(timeout, SmtpStream::dial(host, port, implicit_tls))
            .await
            .map_err(|_| connect_error("connection timed out".into()))?
            .map_err(|e| connect_error(e.to_string()))?;

        tracing::info!(host, port, tls = implicit_tls, "Connected to SMTP server");
        Ok(Self::new(stream, host, port).with_handshake_timeout(timeout))
    }
}

impl<S: Upgrade> Connection<S> {
    /// Wraps an already open stream.
    pub fn new(stream: S, host: impl Into<String>, port: u16) -> Self {
        Self {
            stream: Some(BufReader::new(stream)),
            host: host.into(),
            port,
            handshake_timeout: None,
            io_timeout: None,
        }
    }

    /// Bounds each STARTTLS handshake.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    /// Bounds every read and write; `None` (the default) blocks indefinitely.
    #[must_use]
    pub const fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Host this connection was opened to.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port this connection was opened to.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.stream
            .as_ref()
            .is_some_and(|reader| reader.get_ref().is_secure())
    }

    /// Returns true if a STARTTLS upgrade is possible on this stream.
    #[must_use]
    pub fn tls_available(&self) -> bool {
        self.stream
            .as_ref()
            .is_some_and(|reader| reader.get_ref().tls_available())
    }

    /// Returns true once [`close`](Self::close) ran or a TLS upgrade consumed the stream.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Writes `line` followed by CRLF and flushes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the write fails or the connection is closed.
    pub async fn write_line(&mut self, line: &str) -> Result<usize> {
        let mut data = Vec::with_capacity(line.len() + 2);
        data.extend_from_slice(line.as_bytes());
        data.extend_from_slice(b"\r\n");

        let limit = self.io_timeout;
        let writer = self.reader_mut()?.get_mut();
        with_timeout(limit, async {
            writer.write_all(&data).await?;
            writer.flush().await
        })
        .await?;

        Ok(data.len())
    }

    /// Reads one line, without its trailing CR/LF.
    ///
    /// Returns `Ok(None)` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the read fails or the connection is closed.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        let limit = self.io_timeout;
        let reader = self.reader_mut()?;

        let mut buf = Vec::new();
        let n = with_timeout(limit, reader.read_until(b'\n', &mut buf)).await?;
        if n == 0 {
            return Ok(None);
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        tracing::trace!(%line, "S:");
        Ok(Some(line))
    }

    /// Reads a complete reply.
    ///
    /// Lines are consumed until one without a `-` in the fourth column. If
    /// the stream ends first, the reply code is
    /// [`ReplyCode::NO_RESPONSE`](crate::types::ReplyCode::NO_RESPONSE).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if a read fails. Malformed codes are not errors.
    pub async fn read_reply(&mut self) -> Result<Reply> {
        let mut lines = Vec::new();
        while let Some(line) = self.read_line().await? {
            let is_last = is_last_reply_line(&line);
            lines.push(line);

            if is_last {
                break;
            }
        }

        Ok(parse_reply(&lines))
    }

    /// Sends a command and reads its reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if writing or reading fails.
    pub async fn command(&mut self, cmd: &Command) -> Result<Reply> {
        tracing::debug!(?cmd, "C:");
        self.write_line(&cmd.to_line()).await?;
        self.read_reply().await
    }

    /// Switches the open plaintext stream to TLS.
    ///
    /// A failed handshake leaves the connection closed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tls`] if the stream is already secure or the handshake fails.
    pub async fn upgrade_to_tls(&mut self) -> Result<()> {
        if self.is_secure() {
            return Err(Error::Tls("Already using TLS".into()));
        }

        let reader = self
            .stream
            .take()
            .ok_or_else(|| Error::Io(io::ErrorKind::NotConnected.into()))?;

        let upgrade = reader.into_inner().upgrade_to_tls(&self.host);
        let stream = match self.handshake_timeout {
            Some(limit) => tokio::time::timeout(limit, upgrade)
                .await
                .map_err(|_| Error::Tls("TLS handshake timed out".into()))??,
            None => upgrade.await?,
        };

        self.stream = Some(BufReader::new(stream));
        tracing::info!(host = %self.host, "TLS established");
        Ok(())
    }

    /// Shuts the stream down. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the shutdown itself fails; the stream is
    /// released either way.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut reader) = self.stream.take() {
            reader.get_mut().shutdown().await?;
            tracing::debug!(host = %self.host, "Connection closed");
        }
        Ok(())
    }

    fn reader_mut(&mut self) -> Result<&mut BufReader<S>> {
        self.stream
            .as_mut()
            .ok_or_else(|| Error::Io(io::ErrorKind::NotConnected.into()))
    }
}

async fn with_timeout<T>(
    limit: Option<Duration>,
    op: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, op)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "SMTP I/O timed out"))?,
        None => op.await,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::types::ReplyCode;
    use tokio_test::io::{Builder, Mock};

    impl Upgrade for Mock {
        fn is_secure(&self) -> bool {
            false
        }

        fn tls_available(&self) -> bool {
            false
        }

        async fn upgrade_to_tls(self, _hostname: &str) -> Result<Self> {
            Err(Error::Tls("mock cannot negotiate TLS".into()))
        }
    }

    fn connection(mock: Mock) -> Connection<Mock> {
        Connection::new(mock, "mx.example.com", 25)
    }

    #[tokio::test]
    async fn write_line_appends_crlf() {
        let mock = Builder::new().write(b"EHLO client\r\n").build();
        let mut conn = connection(mock);

        let written = conn.write_line("EHLO client").await.unwrap();
        assert_eq!(written, 13);
    }

    #[tokio::test]
    async fn read_line_strips_terminators() {
        let mock = Builder::new().read(b"220 ready\r\n250 ok\n").build();
        let mut conn = connection(mock);

        assert_eq!(conn.read_line().await.unwrap().as_deref(), Some("220 ready"));
        assert_eq!(conn.read_line().await.unwrap().as_deref(), Some("250 ok"));
        assert_eq!(conn.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn read_reply_multi_line() {
        let mock = Builder::new()
            .read(b"250-mx.example.com\r\n250-SIZE 1000\r\n")
            .read(b"250 AUTH PLAIN\r\n")
            .build();
        let mut conn = connection(mock);

        let reply = conn.read_reply().await.unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
        assert_eq!(reply.text(), "mx.example.com\r\nSIZE 1000\r\nAUTH PLAIN");
    }

    #[tokio::test]
    async fn read_reply_stops_at_terminal_line() {
        let mock = Builder::new().read(b"220 ready\r\n250 next\r\n").build();
        let mut conn = connection(mock);

        let first = conn.read_reply().await.unwrap();
        let second = conn.read_reply().await.unwrap();
        assert_eq!(first.code, ReplyCode::SERVICE_READY);
        assert_eq!(second.code, ReplyCode::OK);
    }

    #[tokio::test]
    async fn read_reply_at_eof() {
        let mock = Builder::new().build();
        let mut conn = connection(mock);

        let reply = conn.read_reply().await.unwrap();
        assert_eq!(reply.code, ReplyCode::NO_RESPONSE);
        assert!(reply.message.is_empty());
    }

    #[tokio::test]
    async fn read_reply_truncated() {
        let mock = Builder::new().read(b"250-mx.example.com\r\n").build();
        let mut conn = connection(mock);

        let reply = conn.read_reply().await.unwrap();
        assert_eq!(reply.code, ReplyCode::NO_RESPONSE);
    }

    #[tokio::test]
    async fn read_reply_garbage_code() {
        let mock = Builder::new().read(b"hello there\r\n").build();
        let mut conn = connection(mock);

        let reply = conn.read_reply().await.unwrap();
        assert_eq!(reply.code, ReplyCode::new(0));
        assert_eq!(reply.text(), "o there");
    }

    #[tokio::test]
    async fn command_round_trip() {
        let mock = Builder::new()
            .write(b"QUIT\r\n")
            .read(b"221 bye\r\n")
            .build();
        let mut conn = connection(mock);

        let reply = conn.command(&Command::Quit).await.unwrap();
        assert_eq!(reply.code, ReplyCode::CLOSING);
        assert_eq!(reply.text(), "bye");
    }

    #[tokio::test]
    async fn upgrade_failure_reports_tls_error() {
        let mock = Builder::new().build();
        let mut conn = connection(mock);

        let err = conn.upgrade_to_tls().await.unwrap_err();
        assert!(matches!(err, Error::Tls(_)));
        assert!(conn.is_closed());
        assert!(!conn.is_secure());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mock = Builder::new().build();
        let mut conn = connection(mock);

        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert!(conn.is_closed());

        let err = conn.write_line("QUIT").await.unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::NotConnected));
    }

    #[tokio::test]
    async fn accessors() {
        let conn = connection(Builder::new().build());
        assert_eq!(conn.host(), "mx.example.com");
        assert_eq!(conn.port(), 25);
        assert!(!conn.tls_available());
    }

    #[tokio::test]
    async fn connect_times_out_on_silent_tls_server() {
        // Never accepted, so the TLS handshake gets no ServerHello.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let err = Connection::connect("127.0.0.1", port, true, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Connect { ref reason, port: p, .. } if reason == "connection timed out" && p == port
        ));
        drop(listener);
    }

    #[tokio::test(start_paused = true)]
    async fn io_timeout_expires() {
        let mock = Builder::new().wait(Duration::from_secs(60)).build();
        let mut conn = connection(mock).with_io_timeout(Some(Duration::from_secs(5)));

        let err = conn.read_reply().await.unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::TimedOut));
    }
}
