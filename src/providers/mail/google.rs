//! Gmail REST adapter.
//!
//! Fetches recent messages through the Gmail API v1: one `users.messages.list`
//! call for ids, then one `users.messages.get?format=full` call per id. Bodies
//! arrive base64url-encoded inside a recursive MIME part tree; text/plain is
//! preferred, text/html is stripped to text as a fallback.

use async_trait::async_trait;
use base64::prelude::*;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;

use super::traits::{status_to_error, FetchError, MailProvider, Result};
use crate::domain::{
    collapse_blank_lines, extract_bare_address, preview_of, strip_html, truncate_chars,
    CanonicalMessage, Credential, Provider, BODY_MAX_CHARS,
};

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Gmail API message list response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    messages: Option<Vec<MessageRef>>,
}

/// Gmail API message reference (id only).
#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

/// Gmail API message, format=full.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    payload: Option<GmailPayload>,
    internal_date: Option<String>,
}

/// Gmail message payload (headers and body parts).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailPayload {
    headers: Option<Vec<GmailHeader>>,
    parts: Option<Vec<GmailPart>>,
    body: Option<GmailBody>,
    mime_type: Option<String>,
}

/// Gmail message header.
#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

/// Gmail message part (for multipart messages).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailPart {
    mime_type: Option<String>,
    body: Option<GmailBody>,
    parts: Option<Vec<GmailPart>>,
}

/// Gmail message body.
#[derive(Debug, Deserialize)]
struct GmailBody {
    data: Option<String>,
}

/// Gmail REST provider adapter.
pub struct GoogleMailProvider {
    client: reqwest::Client,
    api_base: String,
}

impl GoogleMailProvider {
    /// Creates an adapter against the production Gmail API.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            api_base: GMAIL_API_BASE.to_string(),
        }
    }

    /// Creates an adapter against a custom base URL (for tests).
    pub fn with_api_base(client: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
        }
    }

    fn auth_headers(access_token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {access_token}")).map_err(|e| {
                FetchError::Parse {
                    provider: Provider::Google,
                    detail: format!("invalid authorization header: {e}"),
                }
            })?,
        );
        Ok(headers)
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        access_token: &str,
        endpoint: &str,
    ) -> Result<T> {
        let url = format!("{}{}", self.api_base, endpoint);
        let response = self
            .client
            .get(&url)
            .headers(Self::auth_headers(access_token)?)
            .send()
            .await
            .map_err(|e| FetchError::Connection {
                provider: Provider::Google,
                source: e.into(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_to_error(Provider::Google, status.as_u16(), body));
        }

        response.json().await.map_err(|e| FetchError::Parse {
            provider: Provider::Google,
            detail: e.to_string(),
        })
    }

    fn normalize(message: &GmailMessage, account_email: &str) -> CanonicalMessage {
        let headers = message.payload.as_ref().and_then(|p| p.headers.as_ref());

        let get_header = |name: &str| -> Option<String> {
            headers.and_then(|h| {
                h.iter()
                    .find(|hdr| hdr.name.eq_ignore_ascii_case(name))
                    .map(|hdr| hdr.value.clone())
            })
        };

        let subject = get_header("Subject").unwrap_or_else(|| "(sans objet)".to_string());
        let sender = get_header("From")
            .map(|v| extract_bare_address(&v))
            .unwrap_or_default();

        let date = message
            .internal_date
            .as_ref()
            .and_then(|d| d.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        let (text, html) = message
            .payload
            .as_ref()
            .map(extract_body)
            .unwrap_or((None, None));

        let raw_body = match (text, html) {
            (Some(text), _) if !text.trim().is_empty() => text,
            (_, Some(html)) => strip_html(&html),
            _ => String::new(),
        };
        let body = truncate_chars(&collapse_blank_lines(raw_body.trim()), BODY_MAX_CHARS);

        CanonicalMessage {
            id: format!("google_{}", message.id),
            subject,
            sender,
            date,
            preview: preview_of(&body),
            body,
            source: Provider::Google,
            account_email: account_email.to_string(),
            category: None,
        }
    }
}

/// Extracts (text/plain, text/html) bodies from a Gmail payload.
fn extract_body(payload: &GmailPayload) -> (Option<String>, Option<String>) {
    let mut text = None;
    let mut html = None;

    if let (Some(body), Some(mime)) = (&payload.body, &payload.mime_type) {
        match (mime.as_str(), decode_body(body)) {
            ("text/plain", Some(s)) => text = Some(s),
            ("text/html", Some(s)) => html = Some(s),
            _ => {}
        }
    }

    if let Some(parts) = &payload.parts {
        extract_body_from_parts(parts, &mut text, &mut html);
    }

    (text, html)
}

fn extract_body_from_parts(
    parts: &[GmailPart],
    text: &mut Option<String>,
    html: &mut Option<String>,
) {
    for part in parts {
        let mime = part.mime_type.as_deref().unwrap_or("");

        if mime == "text/plain" && text.is_none() {
            if let Some(decoded) = part.body.as_ref().and_then(decode_body) {
                *text = Some(decoded);
            }
        } else if mime == "text/html" && html.is_none() {
            if let Some(decoded) = part.body.as_ref().and_then(decode_body) {
                *html = Some(decoded);
            }
        }

        if let Some(nested) = &part.parts {
            extract_body_from_parts(nested, text, html);
        }
    }
}

fn decode_body(body: &GmailBody) -> Option<String> {
    let data = body.data.as_ref()?;
    let decoded = BASE64_URL_SAFE_NO_PAD.decode(data).ok()?;
    String::from_utf8(decoded).ok()
}

#[async_trait]
impl MailProvider for GoogleMailProvider {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    async fn fetch_messages(
        &self,
        credential: &Credential,
        limit: usize,
    ) -> Result<Vec<CanonicalMessage>> {
        let list: MessageListResponse = self
            .get(
                &credential.access_token,
                &format!("/messages?maxResults={limit}"),
            )
            .await?;

        let refs = list.messages.unwrap_or_default();
        let mut messages = Vec::with_capacity(refs.len());

        for message_ref in refs {
            let endpoint = format!("/messages/{}?format=full", message_ref.id);
            match self
                .get::<GmailMessage>(&credential.access_token, &endpoint)
                .await
            {
                Ok(full) => messages.push(Self::normalize(&full, &credential.email)),
                Err(e) if e.is_retryable_after_refresh() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        message_id = %message_ref.id,
                        error = %e,
                        "skipping unfetchable Gmail message"
                    );
                }
            }
        }

        tracing::debug!(
            account = %credential.email,
            count = messages.len(),
            "fetched Gmail messages"
        );
        Ok(messages)
    }
}
