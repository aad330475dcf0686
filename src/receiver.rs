//! IMAP side: read every unseen message from the default mailbox

use crate::config::{Credentials, DEFAULT_TIMEOUT, ImapEndpoint, MailConfig};
use crate::error::{Error, Result};
use crate::message::IncomingMessage;
use crate::tls;
use async_imap::Session;
use async_imap::error::Error as ImapError;
use async_imap::imap_proto::{MailboxDatum, Response, Status};
use async_imap::types::{Fetch, Seq};
use futures::TryStreamExt;
use futures::io::{AsyncRead, AsyncWrite};
use std::collections::HashSet;
use std::fmt::Debug;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info, warn};

/// A TLS-wrapped IMAP session.
type ImapSession = Session<Compat<tokio_rustls::client::TlsStream<TcpStream>>>;

/// Mailbox selected when none is named.
pub const DEFAULT_MAILBOX: &str = "INBOX";

/// Reads unseen mail over a fresh IMAPS connection per call.
#[derive(Debug, Clone)]
pub struct MailReceiver {
    credentials: Credentials,
    endpoint: ImapEndpoint,
    timeout: Duration,
    accept_invalid_certs: bool,
}

impl MailReceiver {
    #[must_use]
    pub const fn new(credentials: Credentials, endpoint: ImapEndpoint) -> Self {
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
            endpoint: config.imap.clone(),
            timeout: config.timeout,
            accept_invalid_certs: config.accept_invalid_certs,
        }
    }

    #[must_use]
    pub const fn endpoint(&self) -> &ImapEndpoint {
        &self.endpoint
    }

    /// Fetch and parse all unseen messages in `INBOX`.
    ///
    /// Messages come back in the order the server listed them in its
    /// SEARCH response. Fetching with `RFC822` marks them `\Seen` on
    /// the server.
    ///
    /// Once logged in, the session is closed and logged out on every
    /// exit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, login, SELECT, SEARCH, or
    /// any FETCH fails, or if a fetched message cannot be parsed.
    pub async fn unread_messages(&self) -> Result<Vec<IncomingMessage>> {
        let mut session = self.connect().await?;

        let mut selected = false;
        let outcome = self.read_unseen(&mut session, &mut selected).await;
        self.finish(&mut session, selected).await;

        outcome
    }

    // -- private helpers --

    async fn connect(&self) -> Result<ImapSession> {
        let host = self.endpoint.host.as_str();
        let port = self.endpoint.port;
        debug!("Connecting to IMAP server at {}:{}", host, port);

        let tcp_stream = self
            .within("connect", TcpStream::connect((host, port)))
            .await?
            .map_err(|e| Error::Connection(format!("{host}:{port}: {e}")))?;

        let connector = tls::imap_connector(self.accept_invalid_certs)?;
        let server_name = tls::server_name(host)?;
        let tls_stream = self
            .within("TLS handshake", connector.connect(server_name, tcp_stream))
            .await?
            .map_err(|e| Error::Tls(e.to_string()))?;

        let client = async_imap::Client::new(tls_stream.compat());

        // On failure the client is handed back and dropped here, which
        // closes the socket.
        let session = self
            .within(
                "login",
                client.login(self.credentials.username(), self.credentials.password()),
            )
            .await?
            .map_err(|(e, _client)| login_error(e))?;

        info!("Connected to IMAP server");
        Ok(session)
    }

    async fn read_unseen(
        &self,
        session: &mut ImapSession,
        selected: &mut bool,
    ) -> Result<Vec<IncomingMessage>> {
        self.within("select", session.select(DEFAULT_MAILBOX))
            .await?
            .map_err(|e| imap_error(&format!("SELECT {DEFAULT_MAILBOX}"), e))?;
        *selected = true;

        let found = self
            .within("search", search_unseen(session))
            .await?
            .map_err(|e| imap_error("SEARCH UNSEEN", e))?;

        let sequence = search_order(found);
        if sequence.is_empty() {
            debug!("No unseen messages in {}", DEFAULT_MAILBOX);
            return Ok(vec![]);
        }

        info!("Found {} unseen messages", sequence.len());

        let mut messages = Vec::with_capacity(sequence.len());
        for seq in sequence {
            messages.push(self.fetch_one(session, seq).await?);
        }
        Ok(messages)
    }

    async fn fetch_one(&self, session: &mut ImapSession, seq: Seq) -> Result<IncomingMessage> {
        debug!("Fetching message {}", seq);

        let fetch = async {
            let stream = session.fetch(seq.to_string(), "RFC822").await?;
            stream.try_collect::<Vec<Fetch>>().await
        };
        let fetches = self
            .within("fetch", fetch)
            .await?
            .map_err(|e| imap_error(&format!("FETCH {seq}"), e))?;

        let body = fetches
            .iter()
            .find_map(Fetch::body)
            .ok_or_else(|| Error::Protocol(format!("No body found for message {seq}")))?;

        IncomingMessage::parse(seq, body)
    }

    /// CLOSE (if a mailbox was selected) then LOGOUT. Failures here are
    /// logged and never replace the outcome of the call.
    async fn finish(&self, session: &mut ImapSession, selected: bool) {
        if selected {
            match self.within("close", session.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("CLOSE failed: {}", e),
                Err(e) => warn!("{}", e),
            }
        }

        match self.within("logout", session.logout()).await {
            Ok(Ok(())) => debug!("Logged out of IMAP server"),
            Ok(Err(e)) => warn!("LOGOUT failed: {}", e),
            Err(e) => warn!("{}", e),
        }
    }

    async fn within<F, T>(&self, step: &str, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| Error::Timeout(format!("IMAP {step} exceeded {:?}", self.timeout)))
    }
}

/// Run `SEARCH UNSEEN` and collect the hits in the order the server
/// sent them. `Session::search` returns a `HashSet`, which drops the order.
async fn search_unseen<T>(session: &mut Session<T>) -> std::result::Result<Vec<Seq>, ImapError>
where
    T: AsyncRead + AsyncWrite + Unpin + Debug + Send,
{
    let tag = session.run_command("SEARCH UNSEEN").await?;
    let mut hits = Vec::new();

    loop {
        let Some(response) = session.read_response().await? else {
            return Err(ImapError::ConnectionLost);
        };
        match response.parsed() {
            Response::MailboxData(MailboxDatum::Search(found)) => hits.extend_from_slice(found),
            Response::Done {
                tag: done,
                status,
                information,
                ..
            } if done == &tag => {
                let text = information.as_deref().unwrap_or_default().to_string();
                return match status {
                    Status::Ok => Ok(hits),
                    Status::No => Err(ImapError::No(text)),
                    _ => Err(ImapError::Bad(text)),
                };
            }
            _ => {}
        }
    }
}

/// Sequence numbers to fetch, in server order. `0` is never a valid
/// sequence number and is dropped along with repeated hits.
fn search_order(found: Vec<Seq>) -> Vec<Seq> {
    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter(|seq| *seq != 0 && seen.insert(*seq))
        .collect()
}

fn login_error(err: ImapError) -> Error {
    match err {
        ImapError::No(msg) => Error::Authentication(msg),
        other => imap_error("LOGIN", other),
    }
}

fn imap_error(command: &str, err: ImapError) -> Error {
    match err {
        // async-imap reports a response it cannot parse as `ErrorKind::Other`.
        ImapError::Io(e) if e.kind() == io::ErrorKind::Other => {
            Error::Protocol(format!("{command}: malformed response: {e}"))
        }
        ImapError::Io(e) => Error::Connection(format!("{command}: {e}")),
        ImapError::ConnectionLost => Error::Connection(format!("{command}: connection lost")),
        other => Error::Protocol(format!("{command} failed: {other}")),
    }
}
