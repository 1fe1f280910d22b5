//! Service settings types.
//!
//! Settings are persisted to the user's config directory as JSON and loaded
//! at startup. Secrets (client secrets, API keys) live here rather than in
//! the database; the settings file is expected to be permission-restricted
//! by the deployment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level service settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Credential database location.
    pub database: DatabaseSettings,
    /// Message fetch tuning.
    pub fetch: FetchSettings,
    /// Google OAuth application credentials.
    pub google: OAuthClientSettings,
    /// Microsoft OAuth application credentials.
    pub microsoft: OAuthClientSettings,
    /// AI classification configuration.
    pub classifier: ClassifierSettings,
}

/// Credential database configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Explicit database path. When absent, the platform data directory
    /// is used.
    pub path: Option<PathBuf>,
}

/// Message fetch tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSettings {
    /// Per-account fetch deadline in seconds.
    pub timeout_seconds: u64,
    /// Maximum messages fetched per account.
    pub message_limit: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 15,
            message_limit: 50,
        }
    }
}

/// OAuth application credentials for one provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthClientSettings {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Redirect URI registered with the provider.
    pub redirect_uri: String,
}

/// AI classification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// Master switch; when off, every message gets the fallback result.
    pub enabled: bool,
    /// Custom endpoint (Ollama, vLLM). `None` means api.openai.com.
    pub base_url: Option<String>,
    /// API key for the endpoint.
    pub api_key: Option<String>,
    /// Model identifier.
    pub model: String,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: None,
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_seconds: 20,
        }
    }
}
