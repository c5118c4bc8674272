//! Connection configuration types.

use std::time::Duration;

/// Default SMTP port.
pub const DEFAULT_PORT: u16 = 25;

/// Default connect (and TLS handshake) timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Username and password used for AUTH.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Authentication identity.
    pub username: String,
    /// Secret.
    pub password: String,
}

impl Credentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// SMTP connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Negotiate TLS immediately after connecting (e.g. port 465).
    pub implicit_tls: bool,
    /// Upgrade with STARTTLS when the server offers it.
    pub starttls: bool,
    /// Bound on dialing and on each TLS handshake.
    pub connect_timeout: Duration,
    /// Bound on each read and write after connecting. `None` blocks indefinitely.
    pub io_timeout: Option<Duration>,
    /// Name sent with EHLO/HELO.
    pub client_id: String,
    /// Credentials; authentication is skipped when absent.
    pub credentials: Option<Credentials>,
}

impl Config {
    /// Creates a configuration for `host` with every other setting defaulted.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        ConfigBuilder::new(host).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("localhost")
    }
}

/// Builder for connection configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: u16,
    implicit_tls: bool,
    starttls: bool,
    connect_timeout: Duration,
    io_timeout: Option<Duration>,
    client_id: Option<String>,
    credentials: Option<Credentials>,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            implicit_tls: false,
            starttls: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: None,
            client_id: None,
            credentials: None,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enables or disables TLS from the first byte.
    #[must_use]
    pub const fn implicit_tls(mut self, enabled: bool) -> Self {
        self.implicit_tls = enabled;
        self
    }

    /// Enables or disables opportunistic STARTTLS.
    #[must_use]
    pub const fn starttls(mut self, enabled: bool) -> Self {
        self.starttls = enabled;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-operation I/O timeout.
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    /// Sets the name announced in EHLO/HELO.
    #[must_use]
    pub fn client_id(mut self, name: impl Into<String>) -> Self {
        self.client_id = Some(name.into());
        self
    }

    /// Sets the credentials used for AUTH.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Builds the configuration.
    ///
    /// Without an explicit client id, the local hostname is used.
    #[must_use]
    pub fn build(self) -> Config {
        Config {
            host: self.host,
            port: self.port,
            implicit_tls: self.implicit_tls,
            starttls: self.starttls,
            connect_timeout: self.connect_timeout,
            io_timeout: self.io_timeout,
            client_id: self.client_id.unwrap_or_else(local_hostname),
            credentials: self.credentials,
        }
    }
}

/// Resolves the local hostname, falling back to `localhost`.
#[must_use]
pub fn local_hostname() -> String {
    match hostname::get() {
        Ok(name) => match name.into_string() {
            Ok(name) if !name.is_empty() => name,
            Ok(_) => "localhost".into(),
            Err(name) => {
                tracing::warn!(?name, "Hostname is not valid UTF-8, using localhost");
                "localhost".into()
            }
        },
        Err(e) => {
            tracing::warn!(?e, "Unable to get hostname, using localhost");
            "localhost".into()
        }
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

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 25);
        assert!(!config.implicit_tls);
        assert!(config.starttls);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.io_timeout, None);
        assert!(config.credentials.is_none());
        assert!(!config.client_id.is_empty());
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder("smtp.example.com")
            .port(465)
            .implicit_tls(true)
            .starttls(false)
            .connect_timeout(Duration::from_secs(3))
            .io_timeout(Duration::from_secs(30))
            .client_id("client.example.com")
            .credentials("user", "secret")
            .build();

        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 465);
        assert!(config.implicit_tls);
        assert!(!config.starttls);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.io_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.client_id, "client.example.com");
        assert_eq!(config.credentials, Some(Credentials::new("user", "secret")));
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials::new("user", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));
    }
}
