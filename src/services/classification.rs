//! Classification routing.
//!
//! Sits between the aggregation layer and the classifier backend. Bodies are
//! preprocessed before they reach the model, and every backend failure is
//! absorbed into the fixed fallback: classification is advisory and never
//! blocks message display.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ClassifierSettings;
use crate::domain::{
    collapse_blank_lines, truncate_chars, CanonicalMessage, Classification, BODY_MAX_CHARS,
};
use crate::providers::ai::{Classifier, OpenAiClassifier};

/// Routes messages to the configured classifier, if any.
pub struct ClassificationService {
    classifier: Option<Arc<dyn Classifier>>,
}

impl ClassificationService {
    /// Service with an active backend.
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            classifier: Some(classifier),
        }
    }

    /// Service without a backend; every message gets the fallback.
    pub fn disabled() -> Self {
        Self { classifier: None }
    }

    /// Builds the service from settings.
    ///
    /// A disabled or misconfigured backend yields the fallback-only service
    /// rather than an error.
    pub fn from_settings(settings: &ClassifierSettings) -> Self {
        if !settings.enabled {
            return Self::disabled();
        }

        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, "could not build classifier HTTP client");
                return Self::disabled();
            }
        };

        let classifier = match &settings.base_url {
            Some(base_url) => OpenAiClassifier::custom(
                client,
                base_url.clone(),
                settings.api_key.clone(),
                settings.model.clone(),
            ),
            None => OpenAiClassifier::openai(
                client,
                settings.api_key.clone().unwrap_or_default(),
                settings.model.clone(),
            ),
        };
        Self::new(Arc::new(classifier))
    }

    /// Classifies one message, never failing.
    pub async fn classify(&self, message: &CanonicalMessage) -> Classification {
        let Some(classifier) = &self.classifier else {
            return Classification::fallback();
        };

        let mut prepared = message.clone();
        prepared.body = prepare_body(&message.body);

        match classifier.classify(&prepared).await {
            Ok(classification) => classification,
            Err(e) => {
                tracing::warn!(
                    backend = classifier.name(),
                    message_id = %message.id,
                    error = %e,
                    "classification failed, using fallback"
                );
                Classification::fallback()
            }
        }
    }

    /// Attaches a classification to every message in place.
    pub async fn attach(&self, messages: &mut [CanonicalMessage]) {
        for message in messages.iter_mut() {
            let classification = self.classify(message).await;
            message.category = Some(classification);
        }
    }
}

/// Prepares a body for the model: signature stripped, blank runs collapsed,
/// length capped. Adapters already stripped HTML.
fn prepare_body(body: &str) -> String {
    let without_signature = strip_signature(body);
    truncate_chars(&collapse_blank_lines(without_signature), BODY_MAX_CHARS)
}

/// Cuts the body at a signature delimiter or common mobile boilerplate.
fn strip_signature(body: &str) -> &str {
    const MARKERS: [&str; 4] = [
        "\n-- \n",
        "\n--\n",
        "\nEnvoyé de mon iPhone",
        "\nSent from my iPhone",
    ];

    let cut = MARKERS
        .iter()
        .filter_map(|marker| body.find(marker))
        .min()
        .unwrap_or(body.len());
    &body[..cut]
}
