//! SMTP + IMAP mail client library
//!
//! Sends plain-text or JPEG-attachment mail over SMTP with STARTTLS,
//! and reads unseen mail from `INBOX` over implicit-TLS IMAP. Each
//! call opens its own connection and tears it down before returning.
//!
//! Incoming mail is returned as [`IncomingMessage`] values parsed with
//! the [`mailparse`] crate.

mod client;
mod config;
mod error;
mod message;
mod receiver;
mod sender;
mod tls;

pub use client::EmailClient;
pub use config::{
    Credentials, DEFAULT_IMAP_PORT, DEFAULT_SMTP_PORT, DEFAULT_TIMEOUT, ImapEndpoint, MailConfig,
    SmtpEndpoint,
};
pub use error::{Error, Result};
pub use message::{Body, IMAGE_ATTACHMENT_NAME, IMAGE_CONTENT_TYPE, IncomingMessage, OutgoingMessage};
pub use receiver::{DEFAULT_MAILBOX, MailReceiver};
pub use sender::MailSender;
pub use tls::install_default_provider;
