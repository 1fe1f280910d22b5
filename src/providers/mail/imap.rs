//! IMAP adapter.
//!
//! Fetches recent messages over IMAP4rev1 (RFC 3501) via `async-imap` with a
//! rustls TLS stream. Each fetch opens a fresh session, selects INBOX,
//! searches all UIDs, pulls the newest ones, and logs out; no connection is
//! held between fetches. Messages that fail to parse are skipped.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mail_parser::MessageParser;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::TlsConnector;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use super::traits::{FetchError, MailProvider, Result};
use crate::domain::{
    collapse_blank_lines, preview_of, strip_html, truncate_chars, CanonicalMessage, Credential,
    Provider, BODY_MAX_CHARS,
};

/// Type alias for the IMAP session with TLS (using tokio-util compat layer).
type ImapSession = async_imap::Session<Compat<TlsStream<TcpStream>>>;

/// Deadline for establishing the TCP connection.
const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// IMAP provider adapter.
///
/// Stateless: server host and port come from the credential, the password
/// travels in its `access_token` field.
pub struct ImapMailProvider;

impl ImapMailProvider {
    pub fn new() -> Self {
        Self
    }

    /// Establishes a TLS connection with the futures compat wrapper.
    async fn connect_tls(host: &str, port: u16) -> Result<Compat<TlsStream<TcpStream>>> {
        let tcp_stream = tokio::time::timeout(
            CONNECT_TIMEOUT,
            TcpStream::connect((host, port)),
        )
        .await
        .map_err(|_| FetchError::Connection {
            provider: Provider::Imap,
            source: anyhow::anyhow!("TCP connect timed out after {}s", CONNECT_TIMEOUT.as_secs()),
        })?
        .map_err(|e| FetchError::Connection {
            provider: Provider::Imap,
            source: anyhow::Error::new(e).context("TCP connect failed"),
        })?;

        let config = ClientConfig::builder()
            .with_root_certificates(tokio_rustls::rustls::RootCertStore::from_iter(
                webpki_roots::TLS_SERVER_ROOTS.iter().cloned(),
            ))
            .with_no_client_auth();

        let connector = TlsConnector::from(Arc::new(config));
        let server_name =
            ServerName::try_from(host.to_string()).map_err(|e| FetchError::Connection {
                provider: Provider::Imap,
                source: anyhow::Error::new(e).context("invalid server name"),
            })?;

        let tls_stream =
            connector
                .connect(server_name, tcp_stream)
                .await
                .map_err(|e| FetchError::Connection {
                    provider: Provider::Imap,
                    source: anyhow::Error::new(e).context("TLS handshake failed"),
                })?;

        Ok(tls_stream.compat())
    }

    /// Selects INBOX and fetches the newest messages.
    ///
    /// Runs inside the session scope so the caller can log out regardless of
    /// the outcome.
    async fn fetch_inbox(
        session: &mut ImapSession,
        credential: &Credential,
        limit: usize,
    ) -> Result<Vec<CanonicalMessage>> {
        let imap_err = |e: async_imap::error::Error| FetchError::Connection {
            provider: Provider::Imap,
            source: anyhow::Error::new(e),
        };

        session.select("INBOX").await.map_err(imap_err)?;

        let uids = session.uid_search("ALL").await.map_err(imap_err)?;
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        // Newest UIDs first; UIDs are assigned in ascending order.
        let mut sorted: Vec<u32> = uids.into_iter().collect();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        sorted.truncate(limit);

        let uid_set = sorted
            .iter()
            .map(|uid| uid.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let fetched_at = Utc::now().timestamp();
        let fetches: Vec<_> = session
            .uid_fetch(&uid_set, "(UID BODY.PEEK[])")
            .await
            .map_err(imap_err)?
            .try_collect()
            .await
            .map_err(imap_err)?;

        let mut messages = Vec::with_capacity(fetches.len());
        for fetch in &fetches {
            let Some(uid) = fetch.uid else { continue };
            let Some(raw) = fetch.body() else {
                tracing::warn!(uid, "IMAP fetch returned no body, skipping");
                continue;
            };

            match parse_raw_message(uid, fetched_at, raw, &credential.email) {
                Some(message) => messages.push(message),
                None => {
                    tracing::warn!(uid, "unparseable IMAP message, skipping");
                }
            }
        }

        // uid_fetch returns ascending order; callers expect newest first.
        messages.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(messages)
    }
}

impl Default for ImapMailProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses one raw RFC 5322 message into the canonical shape.
///
/// Returns `None` when the message cannot be parsed or carries no sender
/// address; such messages are skipped rather than failing the fetch.
pub fn parse_raw_message(
    uid: u32,
    fetched_at: i64,
    raw: &[u8],
    account_email: &str,
) -> Option<CanonicalMessage> {
    let message = MessageParser::default().parse(raw)?;

    let sender = message
        .from()
        .and_then(|from| from.as_list())
        .and_then(|list| list.first())
        .and_then(|addr| addr.address())
        .map(|s| s.to_string())?;

    let subject = message
        .subject()
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "(sans objet)".to_string());

    let date = message
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(Utc::now);

    let raw_body = match message.body_text(0) {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => message
            .body_html(0)
            .map(|html| strip_html(&html))
            .unwrap_or_default(),
    };
    let body = truncate_chars(&collapse_blank_lines(raw_body.trim()), BODY_MAX_CHARS);

    Some(CanonicalMessage {
        id: format!("imap_{uid}_{fetched_at}"),
        subject,
        sender,
        date,
        preview: preview_of(&body),
        body,
        source: Provider::Imap,
        account_email: account_email.to_string(),
        category: None,
    })
}

#[async_trait]
impl MailProvider for ImapMailProvider {
    fn provider(&self) -> Provider {
        Provider::Imap
    }

    async fn fetch_messages(
        &self,
        credential: &Credential,
        limit: usize,
    ) -> Result<Vec<CanonicalMessage>> {
        let host = credential
            .imap_host
            .as_deref()
            .ok_or_else(|| FetchError::Connection {
                provider: Provider::Imap,
                source: anyhow::anyhow!("credential has no IMAP host"),
            })?;
        let port = credential.imap_port.unwrap_or(993);

        let stream = Self::connect_tls(host, port).await?;
        let client = async_imap::Client::new(stream);

        // A rejected login is the IMAP analogue of an expired OAuth token.
        let mut session = client
            .login(&credential.email, &credential.access_token)
            .await
            .map_err(|(e, _client)| {
                tracing::warn!(account = %credential.email, error = %e, "IMAP login rejected");
                FetchError::Expired {
                    provider: Provider::Imap,
                }
            })?;

        let result = Self::fetch_inbox(&mut session, credential, limit).await;

        // Logout on every path; a failed logout never masks the fetch result.
        if let Err(e) = session.logout().await {
            tracing::debug!(account = %credential.email, error = %e, "IMAP logout failed");
        }

        if let Ok(messages) = &result {
            tracing::debug!(
                account = %credential.email,
                count = messages.len(),
                "fetched IMAP messages"
            );
        }
        result
    }
}
