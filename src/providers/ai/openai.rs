//! OpenAI-compatible classification backend.
//!
//! Works with OpenAI, Ollama, vLLM and other compatible chat-completions
//! endpoints. The model is asked for a single strict-JSON object; anything
//! that does not parse into a [`Classification`] is an error, which the
//! classification router then converts to the fallback.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::traits::{Classifier, ClassifierError, Result};
use crate::domain::{truncate_chars, CanonicalMessage, Classification};

/// Default base URL for OpenAI API.
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Body characters sent to the model; keeps prompts bounded.
const PROMPT_BODY_CHARS: usize = 1_500;

const SYSTEM_PROMPT: &str = "\
Tu classifies les emails d'un commerçant. Réponds uniquement avec un objet \
JSON de la forme \
{\"category\": \"review|order|legal|invoice|advertising|other\", \
\"priority\": \"urgent|medium|low\", \
\"action\": \"...\", \"suggestion\": \"...\" }. \
Le champ suggestion est une courte réponse proposée, ou null.";

/// OpenAI chat-completions request format.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// OpenAI chat-completions response format.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Classifier backed by an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiClassifier {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiClassifier {
    /// Creates a classifier against OpenAI's API.
    pub fn openai(client: reqwest::Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            base_url: OPENAI_BASE_URL.to_string(),
            api_key: Some(api_key.into()),
            model: model.into(),
        }
    }

    /// Creates a classifier against a custom endpoint (Ollama, vLLM, tests).
    pub fn custom(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        }
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(ref api_key) = self.api_key {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        headers
    }

    fn build_request(&self, message: &CanonicalMessage) -> ChatRequest {
        let body = truncate_chars(&message.body, PROMPT_BODY_CHARS);
        let user_prompt = format!(
            "Expéditeur: {}\nObjet: {}\n\n{}",
            message.sender, message.subject, body
        );

        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt,
                },
            ],
            temperature: 0.2,
            max_tokens: 300,
        }
    }

    /// Parses the model output into a classification.
    ///
    /// Tolerates surrounding prose or markdown fences by extracting the first
    /// balanced JSON object, but the object itself must parse strictly.
    fn parse_classification(content: &str) -> Result<Classification> {
        let json = extract_json_object(content).ok_or_else(|| {
            ClassifierError::InvalidResponse("no JSON object in model output".to_string())
        })?;

        serde_json::from_str(json)
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))
    }
}

/// Returns the first balanced `{...}` slice of the input, if any.
fn extract_json_object(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in input[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&input[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn classify(&self, message: &CanonicalMessage) -> Result<Classification> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request(message);

        let response = self
            .client
            .post(&url)
            .headers(self.build_headers())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ApiErrorResponse>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {status}"));

            if status.as_u16() == 401 {
                return Err(ClassifierError::Authentication(message));
            }
            return Err(ClassifierError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                ClassifierError::InvalidResponse("no choices in response".to_string())
            })?;

        Self::parse_classification(&content)
    }
}
