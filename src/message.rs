//! Outgoing and incoming message types
//!
//! Outgoing messages are turned into MIME with `lettre`'s builder.
//! Incoming messages are parsed with `mailparse` and kept as owned
//! values so callers can hold them after the IMAP session is gone.

use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset};
use lettre::Message;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart};
use mailparse::{MailHeaderMap, ParsedMail};
use serde::Serialize;

/// File name given to the attachment of every image message.
pub const IMAGE_ATTACHMENT_NAME: &str = "image.jpg";

/// MIME type of the image attachment.
pub const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

/// Content of an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Sent as a single `text/plain` part.
    Text(String),
    /// JPEG bytes, sent as the only part of a `multipart/mixed` message.
    Image(Vec<u8>),
}

/// A message addressed to exactly one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: Body,
}

impl OutgoingMessage {
    #[must_use]
    pub fn text(from: &str, to: &str, subject: &str, text: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            subject: subject.to_string(),
            body: Body::Text(text.to_string()),
        }
    }

    #[must_use]
    pub fn image(from: &str, to: &str, subject: &str, jpeg: &[u8]) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            subject: subject.to_string(),
            body: Body::Image(jpeg.to_vec()),
        }
    }

    /// Build the MIME message that goes over the wire.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Address`] if either address is not a valid
    /// mailbox, or [`Error::Message`] if lettre rejects the message.
    pub fn to_mime(&self) -> Result<Message> {
        let builder = Message::builder()
            .from(parse_mailbox(&self.from)?)
            .to(parse_mailbox(&self.to)?)
            .subject(self.subject.as_str());

        let message = match &self.body {
            Body::Text(text) => builder.header(ContentType::TEXT_PLAIN).body(text.clone()),
            Body::Image(jpeg) => {
                let content_type = ContentType::parse(IMAGE_CONTENT_TYPE)
                    .map_err(|e| Error::Message(format!("Bad content type: {e}")))?;
                let attachment = Attachment::new(IMAGE_ATTACHMENT_NAME.to_string())
                    .body(jpeg.clone(), content_type);
                builder.multipart(MultiPart::mixed().singlepart(attachment))
            }
        };

        message.map_err(|e| Error::Message(e.to_string()))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| Error::Address(format!("{address}: {e}")))
}

/// A message fetched from the server and parsed.
#[derive(Debug, Clone, Serialize)]
pub struct IncomingMessage {
    /// Sequence number the server reported in its SEARCH response.
    pub sequence: u32,
    /// Every header in the order it appeared.
    pub headers: Vec<(String, String)>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub date: Option<DateTime<FixedOffset>>,
    /// MIME type of the top-level part.
    pub content_type: String,
    /// Decoded body of the first `text/plain` part, or empty.
    pub body: String,
    #[serde(skip)]
    raw: Vec<u8>,
}

impl IncomingMessage {
    /// Parse a raw RFC 822 message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the message structure or its text
    /// body cannot be decoded.
    pub fn parse(sequence: u32, raw: &[u8]) -> Result<Self> {
        let parsed = mailparse::parse_mail(raw).map_err(|e| Error::Parse(e.to_string()))?;

        let headers = parsed
            .headers
            .iter()
            .map(|h| (h.get_key(), h.get_value()))
            .collect();
        let date = parsed
            .headers
            .get_first_value("Date")
            .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok());

        Ok(Self {
            sequence,
            headers,
            from: parsed.headers.get_first_value("From"),
            to: parsed.headers.get_first_value("To"),
            subject: parsed.headers.get_first_value("Subject"),
            date,
            content_type: parsed.ctype.mimetype.clone(),
            body: first_plain_text(&parsed)?.unwrap_or_default(),
            raw: raw.to_vec(),
        })
    }

    /// First value of header `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The message exactly as the server sent it.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Re-parse the raw bytes for access to the full MIME tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if parsing fails.
    pub fn mime(&self) -> Result<ParsedMail<'_>> {
        mailparse::parse_mail(&self.raw).map_err(|e| Error::Parse(e.to_string()))
    }
}

fn first_plain_text(mail: &ParsedMail<'_>) -> Result<Option<String>> {
    if mail.subparts.is_empty() {
        if mail.ctype.mimetype.eq_ignore_ascii_case("text/plain") {
            let body = mail.get_body().map_err(|e| Error::Parse(e.to_string()))?;
            return Ok(Some(body));
        }
        return Ok(None);
    }

    for part in &mail.subparts {
        if let Some(text) = first_plain_text(part)? {
            return Ok(Some(text));
        }
    }
    Ok(None)
}
