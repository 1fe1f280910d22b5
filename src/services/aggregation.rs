//! Cross-account message aggregation.
//!
//! Fans out one fetch task per connected account, collects successes and
//! failures independently, deduplicates across sources and returns a single
//! date-descending list. One broken mailbox never hides the others.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;

use crate::auth::TokenManager;
use crate::config::FetchSettings;
use crate::domain::{CanonicalMessage, Credential, OwnerId, Provider};
use crate::providers::mail::{FetchError, MailProvider};
use crate::services::classification::ClassificationService;
use crate::storage::{CredentialStore, StoreResult};

/// One account's failure, with a non-secret reason.
#[derive(Debug, Clone, Serialize)]
pub struct AccountError {
    pub provider: Provider,
    pub email: String,
    pub reason: String,
}

/// Fetch counters for the aggregate response.
///
/// Every stored credential counts as contacted, so
/// `accounts_succeeded + accounts_failed == accounts_contacted` always holds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregateStats {
    pub accounts_contacted: usize,
    pub accounts_succeeded: usize,
    pub accounts_failed: usize,
    pub messages_fetched: usize,
    pub messages_after_dedup: usize,
}

/// Result of aggregating one owner's mailboxes.
///
/// Serializes to the aggregate endpoint shape, where the message list is
/// named `emails`.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateOutcome {
    #[serde(rename = "emails")]
    pub messages: Vec<CanonicalMessage>,
    pub errors: Vec<AccountError>,
    pub stats: AggregateStats,
}

/// Aggregates messages across all of an owner's connected accounts.
pub struct AggregationService {
    credentials: Arc<dyn CredentialStore>,
    token_manager: Arc<TokenManager>,
    providers: HashMap<Provider, Arc<dyn MailProvider>>,
    classification: Arc<ClassificationService>,
    fetch_timeout: Duration,
    message_limit: usize,
}

impl AggregationService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        token_manager: Arc<TokenManager>,
        classification: Arc<ClassificationService>,
        fetch: &FetchSettings,
    ) -> Self {
        Self {
            credentials,
            token_manager,
            providers: HashMap::new(),
            classification,
            fetch_timeout: Duration::from_secs(fetch.timeout_seconds),
            message_limit: fetch.message_limit,
        }
    }

    /// Registers an adapter under its own provider kind.
    pub fn with_provider(mut self, adapter: Arc<dyn MailProvider>) -> Self {
        self.providers.insert(adapter.provider(), adapter);
        self
    }

    /// Registers the production adapters.
    pub fn with_default_providers(self, client: reqwest::Client) -> Self {
        use crate::providers::mail::{GoogleMailProvider, ImapMailProvider, OutlookMailProvider};
        self.with_provider(Arc::new(GoogleMailProvider::new(client.clone())))
            .with_provider(Arc::new(OutlookMailProvider::new(client)))
            .with_provider(Arc::new(ImapMailProvider::new()))
    }

    /// Fetches, merges, deduplicates and classifies one owner's messages.
    ///
    /// Fetch failures never fail the aggregate; they land in `errors` named
    /// by provider and mailbox. Only a storage failure listing the
    /// credentials is a hard error.
    pub async fn aggregate(&self, owner_id: &OwnerId) -> StoreResult<AggregateOutcome> {
        let credentials = self.credentials.list(owner_id, None).await?;

        let mut errors = Vec::new();
        let mut join_set: JoinSet<(usize, Result<Vec<CanonicalMessage>, String>)> = JoinSet::new();
        let mut slots: Vec<Option<Result<Vec<CanonicalMessage>, String>>> = Vec::new();

        let contacted = credentials.len();
        for (index, credential) in credentials.iter().enumerate() {
            slots.push(None);

            let Some(adapter) = self.providers.get(&credential.provider).cloned() else {
                slots[index] = Some(Err("no adapter for provider".to_string()));
                continue;
            };

            let manager = self.token_manager.clone();
            let credential = credential.clone();
            let timeout = self.fetch_timeout;
            let limit = self.message_limit;

            join_set.spawn(async move {
                let result =
                    match tokio::time::timeout(
                        timeout,
                        fetch_account(manager, adapter, &credential, limit),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(format!(
                            "fetch timed out after {}s",
                            timeout.as_secs()
                        )),
                    };
                (index, result)
            });
        }

        // Siblings keep running whatever happens to the others.
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => {
                    tracing::error!(error = %e, "fetch task panicked");
                }
            }
        }

        // Results are consumed in stored-credential order so dedup's
        // first-wins rule is deterministic regardless of completion order.
        let mut merged: Vec<CanonicalMessage> = Vec::new();
        let mut succeeded = 0usize;
        for (credential, slot) in credentials.iter().zip(slots) {
            match slot {
                Some(Ok(messages)) => {
                    succeeded += 1;
                    merged.extend(messages);
                }
                Some(Err(reason)) => {
                    tracing::warn!(
                        provider = %credential.provider,
                        email = %credential.email,
                        reason = %reason,
                        "account fetch failed"
                    );
                    errors.push(AccountError {
                        provider: credential.provider,
                        email: credential.email.clone(),
                        reason,
                    });
                }
                None => {
                    errors.push(AccountError {
                        provider: credential.provider,
                        email: credential.email.clone(),
                        reason: "fetch task aborted".to_string(),
                    });
                }
            }
        }

        let fetched = merged.len();
        let mut messages = dedup_first_wins(merged);
        messages.sort_by(|a, b| b.date.cmp(&a.date));

        self.classification.attach(&mut messages).await;

        let stats = AggregateStats {
            accounts_contacted: contacted,
            accounts_succeeded: succeeded,
            accounts_failed: errors.len(),
            messages_fetched: fetched,
            messages_after_dedup: messages.len(),
        };

        tracing::info!(
            owner_id = %owner_id,
            accounts = stats.accounts_contacted,
            failed = stats.accounts_failed,
            messages = stats.messages_after_dedup,
            "aggregate complete"
        );

        Ok(AggregateOutcome {
            messages,
            errors,
            stats,
        })
    }
}

/// Fetches one account, refreshing and retrying exactly once when the
/// provider rejects the token.
async fn fetch_account(
    manager: Arc<TokenManager>,
    adapter: Arc<dyn MailProvider>,
    credential: &Credential,
    limit: usize,
) -> Result<Vec<CanonicalMessage>, String> {
    let current = manager
        .ensure_valid(credential)
        .await
        .map_err(|e| e.to_string())?;

    match adapter.fetch_messages(&current, limit).await {
        Ok(messages) => Ok(messages),
        Err(FetchError::Expired { provider }) => {
            tracing::info!(
                provider = %provider,
                email = %credential.email,
                "token rejected mid-fetch, refreshing once"
            );
            let refreshed = manager
                .refresh_now(&current)
                .await
                .map_err(|e| e.to_string())?;
            adapter
                .fetch_messages(&refreshed, limit)
                .await
                .map_err(|e| e.to_string())
        }
        Err(e) => Err(e.to_string()),
    }
}

/// Removes same-(subject, sender, day) duplicates, keeping the first seen.
fn dedup_first_wins(messages: Vec<CanonicalMessage>) -> Vec<CanonicalMessage> {
    let mut seen = HashSet::new();
    messages
        .into_iter()
        .filter(|m| seen.insert(m.dedup_key()))
        .collect()
}
