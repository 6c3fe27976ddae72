//! Raw IMAP over TLS (blocking — run in spawn_blocking).
//!
//! The monitor tracks the inbox message count rather than \Seen flags:
//! each cycle compares the server's EXISTS count against the stored
//! count and fetches only the new sequence numbers. That keeps intake
//! independent of what other clients do with read flags.

use std::io::Write as IoWrite;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use mail_parser::{MessageParser, MimeHeaders};
use secrecy::ExposeSecret;

use crate::config::MailConfig;
use crate::error::MailError;

/// A fetched email with its decoded parts.
#[derive(Debug, Clone)]
pub struct FetchedMail {
    /// IMAP sequence number within the selected mailbox.
    pub seq: u32,
    pub sender: String,
    pub subject: String,
    pub body: String,
    /// (filename, raw bytes) pairs.
    pub attachments: Vec<(String, Vec<u8>)>,
}

/// Connect and return the current inbox message count.
pub fn check_inbox(config: &MailConfig) -> Result<u32, MailError> {
    let mut session = ImapSession::connect(config)?;
    let count = session.message_count;
    session.logout();
    Ok(count)
}

/// Fetch messages with sequence numbers above `last_seen`.
///
/// Returns the current inbox count together with the new messages.
/// Messages that fail to parse are skipped with a warning; one bad
/// email must not stall the whole batch.
pub fn fetch_since(
    config: &MailConfig,
    last_seen: u32,
) -> Result<(u32, Vec<FetchedMail>), MailError> {
    let mut session = ImapSession::connect(config)?;
    let current = session.message_count;

    let mut messages = Vec::new();
    if current > last_seen {
        for seq in (last_seen + 1)..=current {
            match session.fetch(seq) {
                Ok(Some(mail)) => messages.push(mail),
                Ok(None) => tracing::warn!(seq, "Skipping unparseable message"),
                Err(e) => tracing::warn!(seq, error = %e, "Fetch failed, skipping message"),
            }
        }
    }

    session.logout();
    Ok((current, messages))
}

// ── IMAP session ────────────────────────────────────────────────────

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// A logged-in IMAP session with INBOX selected.
struct ImapSession {
    tls: TlsStream,
    message_count: u32,
    tag_counter: u32,
}

impl ImapSession {
    /// Connect, log in, and SELECT INBOX.
    fn connect(config: &MailConfig) -> Result<Self, MailError> {
        let tcp = TcpStream::connect((&*config.imap_host, config.imap_port))
            .map_err(|e| MailError::Connect(format!("{}:{}: {e}", config.imap_host, config.imap_port)))?;
        tcp.set_read_timeout(Some(Duration::from_secs(30)))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls_pki_types::ServerName::try_from(config.imap_host.clone())
            .map_err(|e| MailError::Connect(format!("invalid server name: {e}")))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)?;
        let tls = rustls::StreamOwned::new(conn, tcp);

        let mut session = Self {
            tls,
            message_count: 0,
            tag_counter: 1,
        };

        let _greeting = session.read_line()?;

        let login_resp = session.send_cmd(&format!(
            "LOGIN \"{}\" \"{}\"",
            config.username,
            config.app_password.expose_secret()
        ))?;
        if !login_resp.last().is_some_and(|l| l.contains("OK")) {
            return Err(MailError::Login {
                username: config.username.clone(),
            });
        }

        let select_resp = session.send_cmd("SELECT \"INBOX\"")?;
        session.message_count = parse_exists(&select_resp).ok_or_else(|| MailError::Command {
            command: "SELECT".into(),
            reason: "no EXISTS line in response".into(),
        })?;

        Ok(session)
    }

    fn read_line(&mut self) -> Result<String, MailError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match std::io::Read::read(&mut self.tls, &mut byte) {
                Ok(0) => {
                    return Err(MailError::Connect("IMAP connection closed".into()));
                }
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Send a tagged command and collect response lines up to the tagged
    /// completion line.
    fn send_cmd(&mut self, cmd: &str) -> Result<Vec<String>, MailError> {
        let tag = format!("A{}", self.tag_counter);
        self.tag_counter += 1;

        let full = format!("{tag} {cmd}\r\n");
        IoWrite::write_all(&mut self.tls, full.as_bytes())?;
        IoWrite::flush(&mut self.tls)?;

        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            let done = line.starts_with(&tag);
            lines.push(line);
            if done {
                break;
            }
        }
        Ok(lines)
    }

    /// FETCH one message by sequence number and parse it.
    fn fetch(&mut self, seq: u32) -> Result<Option<FetchedMail>, MailError> {
        let resp = self.send_cmd(&format!("FETCH {seq} RFC822"))?;

        // Drop the untagged FETCH header line and the tagged completion line.
        let raw: String = resp
            .iter()
            .skip(1)
            .take(resp.len().saturating_sub(2))
            .cloned()
            .collect();

        let Some(parsed) = MessageParser::default().parse(raw.as_bytes()) else {
            return Ok(None);
        };

        Ok(Some(FetchedMail {
            seq,
            sender: extract_sender(&parsed),
            subject: parsed.subject().unwrap_or("(no subject)").to_string(),
            body: extract_text(&parsed),
            attachments: extract_attachments(&parsed),
        }))
    }

    fn logout(&mut self) {
        let _ = self.send_cmd("LOGOUT");
    }
}

/// Parse the `* N EXISTS` line of a SELECT response.
fn parse_exists(lines: &[String]) -> Option<u32> {
    for line in lines {
        if line.starts_with('*') && line.contains("EXISTS") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 3
                && let Ok(count) = parts[1].parse()
            {
                return Some(count);
            }
        }
    }
    None
}

/// Extract the sender address from a parsed email.
fn extract_sender(parsed: &mail_parser::Message) -> String {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into())
}

/// Extract readable text from a parsed email.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    "(no readable content)".to_string()
}

/// Collect attachment (filename, bytes) pairs.
fn extract_attachments(parsed: &mail_parser::Message) -> Vec<(String, Vec<u8>)> {
    let mut attachments = Vec::new();
    for part in parsed.attachments() {
        let part: &mail_parser::MessagePart = part;
        let name = MimeHeaders::attachment_name(part)
            .unwrap_or("attachment")
            .to_string();
        attachments.push((name, part.contents().to_vec()));
    }
    attachments
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Tests ───────────────────────────────────────────────────────────
