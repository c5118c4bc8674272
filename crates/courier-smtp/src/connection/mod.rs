//! SMTP connection management: configuration, streams and line I/O.

mod config;
mod line;
mod stream;

pub use config::{
    Config, ConfigBuilder, Credentials, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT, local_hostname,
};
pub use line::Connection;
pub use stream::{SmtpStream, Upgrade};
