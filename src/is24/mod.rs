pub mod attachments;
pub mod client;
pub mod config;
pub mod oauth;

pub use attachments::resolve_attachments;
pub use client::{FetchError, Is24Client, JsonFetch};
pub use config::{ConfigError, Credentials};
pub use oauth::{NonceSource, SignedRequest, Signer};
