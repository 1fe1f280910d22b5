//! Microsoft Graph adapter.
//!
//! Unlike Gmail, Graph returns full message content from a single list call:
//! `GET /v1.0/me/messages` with `$select` for the fields we need and
//! `$orderby=receivedDateTime desc` so the newest messages come first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;

use super::traits::{status_to_error, FetchError, MailProvider, Result};
use crate::domain::{
    collapse_blank_lines, preview_of, strip_html, truncate_chars, CanonicalMessage, Credential,
    Provider, BODY_MAX_CHARS,
};

const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Graph message list response.
#[derive(Debug, Deserialize)]
struct MessageListResponse {
    value: Vec<GraphMessage>,
}

/// Graph message with the `$select`ed fields.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    id: String,
    subject: Option<String>,
    body_preview: Option<String>,
    received_date_time: Option<String>,
    from: Option<GraphRecipient>,
    body: Option<GraphBody>,
}

/// Graph recipient wrapper.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphRecipient {
    email_address: Option<GraphEmailAddress>,
}

/// Graph email address.
#[derive(Debug, Deserialize)]
struct GraphEmailAddress {
    address: Option<String>,
}

/// Graph message body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphBody {
    content_type: Option<String>,
    content: Option<String>,
}

/// Microsoft Graph provider adapter.
pub struct OutlookMailProvider {
    client: reqwest::Client,
    api_base: String,
}

impl OutlookMailProvider {
    /// Creates an adapter against the production Graph API.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            api_base: GRAPH_API_BASE.to_string(),
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
                    provider: Provider::Microsoft,
                    detail: format!("invalid authorization header: {e}"),
                }
            })?,
        );
        Ok(headers)
    }

    fn normalize(message: &GraphMessage, account_email: &str) -> CanonicalMessage {
        let subject = message
            .subject
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "(sans objet)".to_string());

        let sender = message
            .from
            .as_ref()
            .and_then(|f| f.email_address.as_ref())
            .and_then(|a| a.address.clone())
            .unwrap_or_default();

        let date = message
            .received_date_time
            .as_ref()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let raw_body = match &message.body {
            Some(body) => {
                let content = body.content.clone().unwrap_or_default();
                if body.content_type.as_deref() == Some("html") {
                    strip_html(&content)
                } else {
                    content
                }
            }
            None => message.body_preview.clone().unwrap_or_default(),
        };
        let body = truncate_chars(&collapse_blank_lines(raw_body.trim()), BODY_MAX_CHARS);

        CanonicalMessage {
            id: format!("microsoft_{}", message.id),
            subject,
            sender,
            date,
            preview: preview_of(&body),
            body,
            source: Provider::Microsoft,
            account_email: account_email.to_string(),
            category: None,
        }
    }
}

#[async_trait]
impl MailProvider for OutlookMailProvider {
    fn provider(&self) -> Provider {
        Provider::Microsoft
    }

    async fn fetch_messages(
        &self,
        credential: &Credential,
        limit: usize,
    ) -> Result<Vec<CanonicalMessage>> {
        let url = format!(
            "{}/me/messages?$top={limit}\
             &$select=id,subject,bodyPreview,receivedDateTime,from,body\
             &$orderby=receivedDateTime desc",
            self.api_base
        );

        let response = self
            .client
            .get(&url)
            .headers(Self::auth_headers(&credential.access_token)?)
            .send()
            .await
            .map_err(|e| FetchError::Connection {
                provider: Provider::Microsoft,
                source: e.into(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_to_error(Provider::Microsoft, status.as_u16(), body));
        }

        let list: MessageListResponse =
            response.json().await.map_err(|e| FetchError::Parse {
                provider: Provider::Microsoft,
                detail: e.to_string(),
            })?;

        let messages: Vec<CanonicalMessage> = list
            .value
            .iter()
            .map(|m| Self::normalize(m, &credential.email))
            .collect();

        tracing::debug!(
            account = %credential.email,
            count = messages.len(),
            "fetched Outlook messages"
        );
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_message(id: &str, content_type: &str, content: &str) -> GraphMessage {
        GraphMessage {
            id: id.to_string(),
            subject: Some("Facture mai".to_string()),
            body_preview: Some("aperçu".to_string()),
            received_date_time: Some("2024-05-02T10:30:00Z".to_string()),
            from: Some(GraphRecipient {
                email_address: Some(GraphEmailAddress {
                    address: Some("compta@fournisseur.fr".to_string()),
                }),
            }),
            body: Some(GraphBody {
                content_type: Some(content_type.to_string()),
                content: Some(content.to_string()),
            }),
        }
    }

    #[test]
    fn normalize_prefixes_id_and_parses_date() {
        let msg = graph_message("AAMk123", "text", "Veuillez trouver la facture.");
        let canonical = OutlookMailProvider::normalize(&msg, "shop@outlook.com");

        assert_eq!(canonical.id, "microsoft_AAMk123");
        assert_eq!(canonical.subject, "Facture mai");
        assert_eq!(canonical.sender, "compta@fournisseur.fr");
        assert_eq!(canonical.date.to_rfc3339(), "2024-05-02T10:30:00+00:00");
        assert_eq!(canonical.body, "Veuillez trouver la facture.");
        assert_eq!(canonical.source, Provider::Microsoft);
    }

    #[test]
    fn normalize_strips_html_bodies() {
        let msg = graph_message("x", "html", "<div>Bonjour<br>Facture jointe</div>");
        let canonical = OutlookMailProvider::normalize(&msg, "shop@outlook.com");
        assert_eq!(canonical.body, "Bonjour\nFacture jointe");
    }

    #[test]
    fn normalize_handles_missing_fields() {
        let msg = GraphMessage {
            id: "y".to_string(),
            subject: None,
            body_preview: Some("seulement l'aperçu".to_string()),
            received_date_time: Some("pas une date".to_string()),
            from: None,
            body: None,
        };
        let canonical = OutlookMailProvider::normalize(&msg, "shop@outlook.com");

        assert_eq!(canonical.subject, "(sans objet)");
        assert_eq!(canonical.sender, "");
        assert_eq!(canonical.body, "seulement l'aperçu");
        // Unparseable date falls back to now; just check it is recent.
        assert!(Utc::now().signed_duration_since(canonical.date).num_minutes() < 1);
    }
}
