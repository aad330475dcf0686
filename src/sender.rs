//! SMTP side: compose a message and deliver it over STARTTLS

use crate::config::{Credentials, DEFAULT_TIMEOUT, MailConfig, SmtpEndpoint};
use crate::error::{Error, Result};
use crate::message::OutgoingMessage;
use crate::tls;
use lettre::transport::smtp::authentication::{Credentials as SmtpCredentials, Mechanism};
use lettre::transport::smtp::client::Tls;
use lettre::transport::smtp::response::Code;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::time::Duration;
use tracing::{debug, info};

/// Permanent AUTH failures from RFC 4954. `454` is a temporary
/// server-side failure and stays a protocol error.
const AUTH_FAILURE_CODES: &[&str] = &["530", "534", "535", "538"];

/// Sends one message per call over a fresh SMTP connection.
#[derive(Debug, Clone)]
pub struct MailSender {
    credentials: Credentials,
    endpoint: SmtpEndpoint,
    timeout: Duration,
    accept_invalid_certs: bool,
}

impl MailSender {
    #[must_use]
    pub const fn new(credentials: Credentials, endpoint: SmtpEndpoint) -> Self {
        Self {
            credentials,
            endpoint,
            timeout: DEFAULT_TIMEOUT,
            accept_invalid_certs: false,
        }
    }

    #[must_use]
    pub fn from_config(config: &MailConfig) -> Self {
        Self {
            credentials: config.credentials.clone(),
            endpoint: config.smtp.clone(),
            timeout: config.timeout,
            accept_invalid_certs: config.accept_invalid_certs,
        }
    }

    #[must_use]
    pub const fn endpoint(&self) -> &SmtpEndpoint {
        &self.endpoint
    }

    /// Send a `text/plain` message.
    ///
    /// # Errors
    ///
    /// Returns an error if an address is invalid, or if connecting,
    /// STARTTLS, authentication, or delivery fails.
    pub async fn send_text(&self, from: &str, to: &str, subject: &str, body: &str) -> Result<()> {
        self.deliver(&OutgoingMessage::text(from, to, subject, body))
            .await
    }

    /// Send `jpeg` as an `image.jpg` attachment.
    ///
    /// # Errors
    ///
    /// Same as [`MailSender::send_text`].
    pub async fn send_image(&self, from: &str, to: &str, subject: &str, jpeg: &[u8]) -> Result<()> {
        self.deliver(&OutgoingMessage::image(from, to, subject, jpeg))
            .await
    }

    /// EHLO, STARTTLS, EHLO, AUTH, MAIL/RCPT/DATA, QUIT.
    ///
    /// The transport lives only for this call. Dropping it on any
    /// exit path closes the socket. lettre's own timeout covers the TCP
    /// connect only, so the whole exchange runs under `self.timeout`.
    async fn deliver(&self, message: &OutgoingMessage) -> Result<()> {
        let mime = message.to_mime()?;

        tls::install_default_provider();
        let tls_parameters = tls::smtp_parameters(&self.endpoint.host, self.accept_invalid_certs)?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.endpoint.host)
            .port(self.endpoint.port)
            .tls(Tls::Required(tls_parameters))
            .credentials(SmtpCredentials::new(
                self.credentials.username().to_string(),
                self.credentials.password().to_string(),
            ))
            .authentication(vec![Mechanism::Plain, Mechanism::Login])
            .timeout(Some(self.timeout))
            .build();

        debug!(
            "Delivering to {} via {}:{}",
            message.to, self.endpoint.host, self.endpoint.port
        );

        tokio::time::timeout(self.timeout, transport.send(mime))
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "SMTP exchange with {} exceeded {:?}",
                    self.endpoint.host, self.timeout
                ))
            })?
            .map_err(|e| classify(&e))?;

        info!("Delivered message to {}", message.to);
        Ok(())
    }
}

fn classify(err: &lettre::transport::smtp::Error) -> Error {
    let text = err.to_string();
    if err.is_timeout() {
        return Error::Timeout(format!("SMTP: {text}"));
    }
    if err.is_tls() {
        return Error::Tls(format!("STARTTLS failed: {text}"));
    }
    if let Some(code) = err.status() {
        return if is_auth_failure(code) {
            Error::Authentication(text)
        } else {
            Error::Protocol(format!("SMTP {code}: {text}"))
        };
    }
    if err.is_client() || err.is_response() {
        return Error::Protocol(format!("SMTP: {text}"));
    }
    Error::Connection(format!("SMTP: {text}"))
}

fn is_auth_failure(code: Code) -> bool {
    let code = code.to_string();
    AUTH_FAILURE_CODES.contains(&code.as_str())
}
