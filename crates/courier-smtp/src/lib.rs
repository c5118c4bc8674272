//! # courier-smtp
//!
//! An SMTP client transport (RFC 5321) for handing single messages to a
//! relay.
//!
//! ## Features
//!
//! - **Session setup**: greeting, EHLO with HELO fallback, extension discovery
//! - **TLS**: implicit TLS (port 465) and opportunistic STARTTLS with renegotiation
//! - **Authentication**: DIGEST-MD5, CRAM-MD5, LOGIN and PLAIN, strongest first
//! - **Submission**: MAIL/RCPT/DATA with `Bcc` stripping, dot-stuffing and SIZE checks
//! - **Teardown**: QUIT and close on every path, errors suppressed
//!
//! ## Quick Start
//!
//! ```ignore
//! use courier_smtp::{Config, Headers, SmtpTransport};
//!
//! #[tokio::main]
//! async fn main() -> courier_smtp::Result<()> {
//!     let config = Config::builder("smtp.example.com")
//!         .port(587)
//!         .credentials("user@example.com", "password")
//!         .build();
//!
//!     let mut transport = SmtpTransport::connect(&config).await?;
//!
//!     let headers = Headers::new()
//!         .with("From", "user@example.com")
//!         .with("To", "friend@example.com")
//!         .with("Subject", "Hello");
//!     let result = transport
//!         .send("user@example.com", &["friend@example.com".into()], "Hi!", &headers)
//!         .await;
//!
//!     transport.quit().await;
//!     result
//! }
//! ```
//!
//! ## Modules
//!
//! - [`auth`]: SASL mechanisms
//! - [`command`]: SMTP command lines
//! - [`connection`]: Configuration, streams and the line transport
//! - [`parser`]: Reply parser
//! - [`transport`]: The protocol engine
//! - [`types`]: Replies, extensions and headers

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod transport;
pub mod types;

pub use connection::{Config, ConfigBuilder, Connection, Credentials, SmtpStream, Upgrade};
pub use error::{Error, Result};
pub use transport::{Envelope, MailTransport, SessionState, SmtpTransport, deliver, send_mail};
pub use types::{AuthMechanism, ExtensionSet, ExtensionValue, Headers, Reply, ReplyCode};
