//! In-process fake IMAPS server
//!
//! ## Connection lifecycle
//!
//! ```text
//!   Client connects via TCP
//!       |
//!   TLS handshake (implicit TLS, as on port 993)
//!       |
//!   Server sends greeting: "* OK IMAP4rev1 ready\r\n"
//!       |
//!   Client sends LOGIN, then SELECT, SEARCH, FETCH, ...
//!       |
//!   Client sends CLOSE and LOGOUT
//! ```
//!
//! Every client command starts with a tag (async-imap uses `A0001`,
//! `A0002`, ...) that the server echoes in its completion line.
//! Lines prefixed with `*` are untagged data sent before that line.
//!
//! ## Event log
//!
//! The server appends one entry per command it handles (`LOGIN`,
//! `SELECT INBOX`, `SEARCH`, `FETCH 2`, `CLOSE`, `LOGOUT`) and a
//! final `DISCONNECT` when the socket goes away. Tests use the log to
//! check that a session was torn down properly.
//!
//! ## Stalling
//!
//! A server started with [`FakeImapServer::start_stalling`] answers
//! LOGIN and then goes silent: later commands are logged but never
//! answered, as with a hung backend.

use super::handlers::{
    handle_close, handle_fetch, handle_login, handle_logout, handle_search, handle_select,
};
use super::io::write_line;
use super::mailbox::Mailbox;
use crate::fake_tls;
use imap_codec::CommandCodec;
use imap_codec::decode::Decoder;
use imap_codec::imap_types::command::CommandBody;
use imap_codec::imap_types::mailbox::Mailbox as ImapMailbox;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

pub const USERNAME: &str = "testuser";
pub const PASSWORD: &str = "testpass";

type EventLog = Arc<Mutex<Vec<String>>>;

/// A fake IMAPS server on `127.0.0.1` with an OS-assigned port.
///
/// Accepts `USERNAME` / `PASSWORD` only. Runs until dropped.
pub struct FakeImapServer {
    port: u16,
    events: EventLog,
    mailbox: Arc<Mutex<Mailbox>>,
    /// Handle to the background task so it lives as long as the server.
    _handle: tokio::task::JoinHandle<()>,
}

impl FakeImapServer {
    pub async fn start(mailbox: Mailbox) -> Self {
        Self::launch(mailbox, false).await
    }

    /// Like [`FakeImapServer::start`], but stops answering after LOGIN.
    pub async fn start_stalling(mailbox: Mailbox) -> Self {
        Self::launch(mailbox, true).await
    }

    async fn launch(mailbox: Mailbox, stall_after_login: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();

        let acceptor = fake_tls::acceptor();
        let mailbox = Arc::new(Mutex::new(mailbox));
        let events: EventLog = Arc::default();

        let handle = {
            let mailbox = mailbox.clone();
            let events = events.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _addr)) = listener.accept().await else {
                        break;
                    };
                    let acceptor = acceptor.clone();
                    let mailbox = mailbox.clone();
                    let events = events.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, acceptor, &mailbox, &events, stall_after_login)
                            .await;
                    });
                }
            })
        };

        Self {
            port,
            events,
            mailbox,
            _handle: handle,
        }
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Snapshot of the event log.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Current `\Seen` flags of a folder, in sequence order.
    pub fn seen_flags(&self, folder: &str) -> Vec<bool> {
        self.mailbox
            .lock()
            .unwrap()
            .get_folder(folder)
            .map(|f| f.emails.iter().map(|e| e.seen).collect())
            .unwrap_or_default()
    }

    /// Wait until `count` connections have ended. Returns false if
    /// that does not happen within two seconds.
    pub async fn wait_for_disconnects(&self, count: usize) -> bool {
        for _ in 0..200 {
            let ended = self
                .events()
                .iter()
                .filter(|e| e.as_str() == "DISCONNECT")
                .count();
            if ended >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    acceptor: TlsAcceptor,
    mailbox: &Mutex<Mailbox>,
    events: &Mutex<Vec<String>>,
    stall_after_login: bool,
) {
    if let Ok(tls_stream) = acceptor.accept(stream).await {
        handle_imap_session(tls_stream, mailbox, events, stall_after_login).await;
    }
    events.lock().unwrap().push("DISCONNECT".to_string());
}

/// Event log entry for a decoded command.
fn event_label(body: &CommandBody<'_>) -> String {
    match body {
        CommandBody::Login { .. } => "LOGIN".to_string(),
        CommandBody::Logout => "LOGOUT".to_string(),
        CommandBody::Select { mailbox, .. } => format!("SELECT {}", mailbox_name(mailbox)),
        CommandBody::Search { .. } => "SEARCH".to_string(),
        CommandBody::Fetch { sequence_set, .. } => format!("FETCH {}", fetch_label(sequence_set)),
        CommandBody::Close => "CLOSE".to_string(),
        _ => "OTHER".to_string(),
    }
}

fn mailbox_name(mb: &ImapMailbox<'_>) -> String {
    match mb {
        ImapMailbox::Inbox => "INBOX".to_string(),
        ImapMailbox::Other(other) => {
            let bytes: &[u8] = other.as_ref();
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Greet the client, then parse each command line with
/// `imap-codec` and dispatch on its `CommandBody`.
async fn handle_imap_session<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    mailbox: &Mutex<Mailbox>,
    events: &Mutex<Vec<String>>,
    stall_after_login: bool,
) {
    let mut reader = BufReader::new(stream);
    let mut authenticated = false;
    let mut selected_folder: Option<String> = None;
    let codec = CommandCodec::default();

    if write_line(&mut reader, "* OK IMAP4rev1 Fake server ready\r\n")
        .await
        .is_err()
    {
        return;
    }

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let Ok((_, command)) = codec.decode(line.as_bytes()) else {
            let tag = trimmed.split_whitespace().next().unwrap_or("*");
            let resp = format!("{tag} BAD Parse error\r\n");
            if write_line(&mut reader, &resp).await.is_err() {
                break;
            }
            continue;
        };

        let tag = command.tag.inner();
        events.lock().unwrap().push(event_label(&command.body));

        if stall_after_login && authenticated {
            continue;
        }

        match command.body {
            CommandBody::Login { username, password } => {
                let user = String::from_utf8_lossy(username.as_ref()).into_owned();
                let pass = String::from_utf8_lossy(password.declassify().as_ref()).into_owned();
                authenticated =
                    handle_login(tag, &user, &pass, (USERNAME, PASSWORD), &mut reader).await;
            }
            CommandBody::Logout => {
                handle_logout(tag, &mut reader).await;
                break;
            }
            _ if !authenticated => {
                let resp = format!("{tag} NO Not authenticated\r\n");
                if write_line(&mut reader, &resp).await.is_err() {
                    break;
                }
            }
            CommandBody::Select { mailbox: mb, .. } => {
                let name = mailbox_name(&mb);
                let snap = mailbox.lock().unwrap().clone();
                selected_folder = handle_select(tag, &name, &snap, &mut reader).await;
            }
            CommandBody::Search {
                criteria,
                uid: false,
                ..
            } => {
                let snap = mailbox.lock().unwrap().clone();
                handle_search(
                    tag,
                    criteria.as_ref(),
                    &snap,
                    selected_folder.as_deref(),
                    &mut reader,
                )
                .await;
            }
            CommandBody::Fetch {
                sequence_set,
                uid: false,
                ..
            } => {
                handle_fetch(
                    tag,
                    &sequence_set,
                    mailbox,
                    selected_folder.as_deref(),
                    &mut reader,
                )
                .await;
            }
            CommandBody::Close => {
                handle_close(tag, &mut selected_folder, &mut reader).await;
            }
            _ => {
                let resp = format!("{tag} BAD Unknown command\r\n");
                if write_line(&mut reader, &resp).await.is_err() {
                    break;
                }
            }
        }
    }
}

fn fetch_label(sequence_set: &imap_codec::imap_types::sequence::SequenceSet) -> String {
    super::handlers::fetch_numbers(sequence_set)
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
