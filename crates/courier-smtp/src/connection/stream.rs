//! Low-level SMTP stream handling.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::{
    TlsConnector,
    rustls::{ClientConfig, RootCertStore},
};

use crate::error::{Error, Result};

/// A byte stream that can be switched to TLS in place.
///
/// Implemented by [`SmtpStream`]; test doubles implement it to stand in for
/// a real socket.
pub trait Upgrade: AsyncRead + AsyncWrite + Unpin + Send + Sized {
    /// Returns true if the stream is TLS-encrypted.
    fn is_secure(&self) -> bool;

    /// Returns true if this stream can perform a TLS handshake.
    fn tls_available(&self) -> bool {
        true
    }

    /// Performs a client TLS handshake over this stream.
    fn upgrade_to_tls(self, hostname: &str) -> impl Future<Output = Result<Self>> + Send;
}

/// SMTP stream (TCP or TLS).
#[derive(Debug)]
pub enum SmtpStream {
    /// Plain TCP connection.
    Tcp(TcpStream),
    /// TLS-encrypted connection (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl SmtpStream {
    /// Opens a TCP connection, optionally negotiating TLS straight away.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if dialing or the handshake fails.
    pub async fn dial(hostname: &str, port: u16, implicit_tls: bool) -> io::Result<Self> {
        let tcp = TcpStream::connect((hostname, port)).await?;
        if !implicit_tls {
            return Ok(Self::Tcp(tcp));
        }

        let tls = handshake(hostname, tcp).await?;
        Ok(Self::Tls(Box::new(tls)))
    }
}

impl Upgrade for SmtpStream {
    fn is_secure(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    async fn upgrade_to_tls(self, hostname: &str) -> Result<Self> {
        let tcp = match self {
            Self::Tcp(tcp) => tcp,
            Self::Tls(_) => return Err(Error::Tls("Already using TLS".into())),
        };

        let tls = handshake(hostname, tcp)
            .await
            .map_err(|e| Error::Tls(e.to_string()))?;
        Ok(Self::Tls(Box::new(tls)))
    }
}

impl AsyncRead for SmtpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SmtpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

async fn handshake(hostname: &str, tcp: TcpStream) -> io::Result<TlsStream<TcpStream>> {
    let server_name = ServerName::try_from(hostname.to_string()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Invalid hostname: {hostname}"),
        )
    })?;

    create_tls_connector().connect(server_name, tcp).await
}

/// Creates a TLS connector with the webpki root certificates.
fn create_tls_connector() -> TlsConnector {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}
