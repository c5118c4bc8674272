#![allow(clippy::doc_markdown)]
//! Example: Send one message through an SMTP relay
//!
//! Connects, upgrades with STARTTLS when offered, authenticates if
//! credentials are given, sends a short text message and quits.
//!
//! ## Configuration
//!
//! | Variable        | Meaning                         | Default     |
//! |-----------------|---------------------------------|-------------|
//! | `SMTP_HOST`     | Relay hostname                  | `localhost` |
//! | `SMTP_PORT`     | Relay port                      | `25`        |
//! | `SMTP_TLS`      | `1` for implicit TLS (port 465) | off         |
//! | `SMTP_USER`     | AUTH username                   | none        |
//! | `SMTP_PASSWORD` | AUTH password                   | none        |
//! | `MAIL_FROM`     | Envelope sender                 | required    |
//! | `MAIL_TO`       | Comma-separated recipients      | required    |
//!
//! ## Running
//!
//! ```bash
//! RUST_LOG=courier_smtp=trace MAIL_FROM=me@example.com MAIL_TO=you@example.com \
//!     cargo run --package courier-smtp --example send
//! ```

use std::env;

use anyhow::Context;
use courier_smtp::{Config, Envelope, Headers, send_mail};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let host = env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".into());
    let port = env::var("SMTP_PORT")
        .ok()
        .map(|p| p.parse::<u16>())
        .transpose()
        .context("SMTP_PORT is not a port number")?;
    let implicit_tls = env::var("SMTP_TLS").is_ok_and(|v| v == "1");

    let mut builder = Config::builder(host.as_str()).implicit_tls(implicit_tls);
    if let Some(port) = port {
        builder = builder.port(port);
    } else if implicit_tls {
        builder = builder.port(465);
    }
    if let (Ok(user), Ok(password)) = (env::var("SMTP_USER"), env::var("SMTP_PASSWORD")) {
        builder = builder.credentials(user, password);
    }
    let config = builder.build();

    let from = env::var("MAIL_FROM").context("MAIL_FROM is not set")?;
    let recipients: Vec<String> = env::var("MAIL_TO")
        .context("MAIL_TO is not set")?
        .split(',')
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();

    let headers = Headers::new()
        .with("From", from.as_str())
        .with("To", recipients.join(", "))
        .with("Subject", "courier-smtp test message");
    let envelope = Envelope {
        from,
        recipients,
        body: "Sent by the courier-smtp example.".into(),
        headers,
    };

    send_mail(&config, &envelope)
        .await
        .with_context(|| format!("delivery through {}:{} failed", config.host, config.port))?;

    tracing::info!(recipients = envelope.recipients.len(), "Done");
    Ok(())
}
