//! Core SMTP types.

mod extension;
mod headers;
mod reply;

pub use extension::{AuthMechanism, ExtensionSet, ExtensionValue};
pub use headers::Headers;
pub use reply::{Reply, ReplyCode};
