//! Connection configuration for the SMTP and IMAP sides

use crate::error::{Error, Result};
use std::env;
use std::fmt;
use std::time::Duration;

/// Default SMTP submission port (STARTTLS).
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Default IMAPS port (implicit TLS).
pub const DEFAULT_IMAP_PORT: u16 = 993;

/// Default bound on every network step.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Username and password shared by the SMTP and IMAP clients.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// SMTP server address. The connection is upgraded with STARTTLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpEndpoint {
    pub host: String,
    pub port: u16,
}

impl SmtpEndpoint {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// IMAP server address. The connection uses implicit TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImapEndpoint {
    pub host: String,
    pub port: u16,
}

impl ImapEndpoint {
    /// Endpoint on the standard IMAPS port.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_port(host, DEFAULT_IMAP_PORT)
    }

    #[must_use]
    pub fn with_port(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Everything needed to build an [`EmailClient`](crate::EmailClient).
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub credentials: Credentials,
    pub smtp: SmtpEndpoint,
    pub imap: ImapEndpoint,
    /// Upper bound for connecting and for each protocol step.
    pub timeout: Duration,
    /// Skip certificate verification on both protocols. Only meant
    /// for local bridges and test servers with self-signed certs.
    pub accept_invalid_certs: bool,
}

impl MailConfig {
    #[must_use]
    pub const fn new(credentials: Credentials, smtp: SmtpEndpoint, imap: ImapEndpoint) -> Self {
        Self {
            credentials,
            smtp,
            imap,
            timeout: DEFAULT_TIMEOUT,
            accept_invalid_certs: false,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Load configuration from environment variables
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `MAIL_USERNAME`
    /// - `MAIL_PASSWORD`
    /// - `SMTP_HOST`
    /// - `IMAP_HOST`
    ///
    /// Optional (with defaults):
    /// - `SMTP_PORT` (default: `587`)
    /// - `IMAP_PORT` (default: `993`)
    /// - `MAIL_TIMEOUT_SECS` (default: `30`)
    /// - `MAIL_ACCEPT_INVALID_CERTS` (default: `false`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required variable is missing or
    /// a value does not parse.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`MailConfig::from_env`].
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).ok_or_else(|| Error::Config(format!("{key} not set")));

        let smtp_port = match lookup("SMTP_PORT") {
            Some(v) => v
                .parse()
                .map_err(|e| Error::Config(format!("Invalid SMTP_PORT: {e}")))?,
            None => DEFAULT_SMTP_PORT,
        };
        let imap_port = match lookup("IMAP_PORT") {
            Some(v) => v
                .parse()
                .map_err(|e| Error::Config(format!("Invalid IMAP_PORT: {e}")))?,
            None => DEFAULT_IMAP_PORT,
        };
        let timeout = match lookup("MAIL_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(
                v.parse()
                    .map_err(|e| Error::Config(format!("Invalid MAIL_TIMEOUT_SECS: {e}")))?,
            ),
            None => DEFAULT_TIMEOUT,
        };
        let accept_invalid_certs = match lookup("MAIL_ACCEPT_INVALID_CERTS") {
            Some(v) => parse_bool(&v).ok_or_else(|| {
                Error::Config(format!("Invalid MAIL_ACCEPT_INVALID_CERTS: {v}"))
            })?,
            None => false,
        };

        Ok(Self {
            credentials: Credentials::new(required("MAIL_USERNAME")?, required("MAIL_PASSWORD")?),
            smtp: SmtpEndpoint::new(required("SMTP_HOST")?, smtp_port),
            imap: ImapEndpoint::with_port(required("IMAP_HOST")?, imap_port),
            timeout,
            accept_invalid_certs,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
