//! Combined SMTP + IMAP client

use crate::config::{Credentials, ImapEndpoint, MailConfig, SmtpEndpoint};
use crate::error::Result;
use crate::message::IncomingMessage;
use crate::receiver::MailReceiver;
use crate::sender::MailSender;

/// Sends and receives mail with one set of credentials.
///
/// Holds a [`MailSender`] and a [`MailReceiver`]; every method
/// delegates to one of them.
#[derive(Debug, Clone)]
pub struct EmailClient {
    sender: MailSender,
    receiver: MailReceiver,
}

impl EmailClient {
    /// Client for an SMTP server at `smtp_host:smtp_port` and an IMAPS
    /// server at `imap_host:993`.
    #[must_use]
    pub fn new(
        username: &str,
        password: &str,
        smtp_host: &str,
        smtp_port: u16,
        imap_host: &str,
    ) -> Self {
        let credentials = Credentials::new(username, password);
        Self {
            sender: MailSender::new(credentials.clone(), SmtpEndpoint::new(smtp_host, smtp_port)),
            receiver: MailReceiver::new(credentials, ImapEndpoint::new(imap_host)),
        }
    }

    #[must_use]
    pub fn from_config(config: &MailConfig) -> Self {
        Self {
            sender: MailSender::from_config(config),
            receiver: MailReceiver::from_config(config),
        }
    }

    #[must_use]
    pub const fn sender(&self) -> &MailSender {
        &self.sender
    }

    #[must_use]
    pub const fn receiver(&self) -> &MailReceiver {
        &self.receiver
    }

    /// See [`MailSender::send_text`].
    ///
    /// # Errors
    ///
    /// Returns any error from the SMTP exchange.
    pub async fn send_text(&self, from: &str, to: &str, subject: &str, body: &str) -> Result<()> {
        self.sender.send_text(from, to, subject, body).await
    }

    /// See [`MailSender::send_image`].
    ///
    /// # Errors
    ///
    /// Returns any error from the SMTP exchange.
    pub async fn send_image(&self, from: &str, to: &str, subject: &str, jpeg: &[u8]) -> Result<()> {
        self.sender.send_image(from, to, subject, jpeg).await
    }

    /// See [`MailReceiver::unread_messages`].
    ///
    /// # Errors
    ///
    /// Returns any error from the IMAP exchange.
    pub async fn unread_messages(&self) -> Result<Vec<IncomingMessage>> {
        self.receiver.unread_messages().await
    }
}
