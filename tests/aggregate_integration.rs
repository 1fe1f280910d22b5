//! End-to-end aggregation tests over a real SQLite store.
//!
//! Providers and the token refresher are mocked; everything else (stores,
//! token manager, aggregation, classification routing) is the production
//! wiring.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use inlet::auth::{AuthError, RefreshedTokens, TokenManager, TokenRefresher};
use inlet::config::FetchSettings;
use inlet::domain::{CanonicalMessage, Credential, Owner, OwnerId, Provider};
use inlet::providers::mail::{FetchError, MailProvider};
use inlet::services::{AggregationService, ClassificationService};
use inlet::storage::{CredentialStore, Database, OwnerStore, SqliteCredentialStore, SqliteOwnerStore};

struct StaticRefresher {
    refreshed: AtomicUsize,
}

#[async_trait]
impl TokenRefresher for StaticRefresher {
    async fn refresh(
        &self,
        _provider: Provider,
        refresh_token: &str,
    ) -> Result<RefreshedTokens, AuthError> {
        self.refreshed.fetch_add(1, Ordering::SeqCst);
        if refresh_token == "dead-refresh" {
            return Err(AuthError::TokenExchange {
                status: 400,
                body: "invalid_grant".to_string(),
            });
        }
        Ok(RefreshedTokens {
            access_token: "fresh-access".to_string(),
            refresh_token: None,
            expires_in: Some(3600),
        })
    }
}

enum Behavior {
    Healthy(Vec<CanonicalMessage>),
    ConnectionFailure,
}

struct ScriptedProvider {
    kind: Provider,
    behavior: Behavior,
}

#[async_trait]
impl MailProvider for ScriptedProvider {
    fn provider(&self) -> Provider {
        self.kind
    }

    async fn fetch_messages(
        &self,
        _credential: &Credential,
        _limit: usize,
    ) -> Result<Vec<CanonicalMessage>, FetchError> {
        match &self.behavior {
            Behavior::Healthy(messages) => Ok(messages.clone()),
            Behavior::ConnectionFailure => Err(FetchError::Connection {
                provider: self.kind,
                source: anyhow::anyhow!("connection refused"),
            }),
        }
    }
}

fn canonical(id: &str, subject: &str, source: Provider, day: u32) -> CanonicalMessage {
    CanonicalMessage {
        id: id.to_string(),
        subject: subject.to_string(),
        sender: "client@example.fr".to_string(),
        date: chrono::NaiveDate::from_ymd_opt(2024, 5, day)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            .and_utc(),
        preview: String::new(),
        body: "corps".to_string(),
        source,
        account_email: "shop@example.fr".to_string(),
        category: None,
    }
}

struct Harness {
    owner_id: OwnerId,
    credentials: SqliteCredentialStore,
    refresher: Arc<StaticRefresher>,
    manager: Arc<TokenManager>,
}

async fn harness() -> Harness {
    let db = Database::open_in_memory().await.unwrap();
    let owners = SqliteOwnerStore::new(db.clone());
    let credentials = SqliteCredentialStore::new(db);

    let owner = Owner::new("owner@shop.fr", Some("Chez Dupont".to_string()));
    let owner_id = owner.id.clone();
    owners.insert(&owner).await.unwrap();

    let refresher = Arc::new(StaticRefresher {
        refreshed: AtomicUsize::new(0),
    });
    let store: Arc<dyn CredentialStore> = Arc::new(credentials.clone());
    let manager = Arc::new(TokenManager::new(refresher.clone(), store));

    Harness {
        owner_id,
        credentials,
        refresher,
        manager,
    }
}

fn aggregation(
    harness: &Harness,
    providers: Vec<Arc<ScriptedProvider>>,
) -> AggregationService {
    let mut service = AggregationService::new(
        Arc::new(harness.credentials.clone()),
        harness.manager.clone(),
        Arc::new(ClassificationService::disabled()),
        &FetchSettings::default(),
    );
    for provider in providers {
        service = service.with_provider(provider);
    }
    service
}

#[tokio::test]
async fn healthy_google_plus_failing_imap_yields_partial_result() {
    let h = harness().await;

    h.credentials
        .upsert(&Credential::oauth(
            h.owner_id.clone(),
            Provider::Google,
            "shop@gmail.com",
            "live-token",
            Some("refresh".to_string()),
            Some(Utc::now() + chrono::Duration::hours(1)),
        ))
        .await
        .unwrap();
    h.credentials
        .upsert(&Credential::imap(
            h.owner_id.clone(),
            "shop@ovh.fr",
            "app-password",
            "ssl0.ovh.net",
            993,
        ))
        .await
        .unwrap();

    let service = aggregation(
        &h,
        vec![
            Arc::new(ScriptedProvider {
                kind: Provider::Google,
                behavior: Behavior::Healthy(vec![
                    canonical("google_1", "Commande #1", Provider::Google, 2),
                    canonical("google_2", "Commande #2", Provider::Google, 3),
                ]),
            }),
            Arc::new(ScriptedProvider {
                kind: Provider::Imap,
                behavior: Behavior::ConnectionFailure,
            }),
        ],
    );

    let outcome = service.aggregate(&h.owner_id).await.unwrap();

    assert_eq!(outcome.messages.len(), 2);
    assert!(outcome.messages.iter().all(|m| m.source == Provider::Google));

    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].provider, Provider::Imap);
    assert_eq!(outcome.errors[0].email, "shop@ovh.fr");
    assert!(outcome.errors[0].reason.contains("connection refused"));

    assert_eq!(outcome.stats.accounts_contacted, 2);
    assert_eq!(outcome.stats.accounts_succeeded, 1);
    assert_eq!(outcome.stats.accounts_failed, 1);
}

#[tokio::test]
async fn expired_credential_is_refreshed_and_persisted_through_the_store() {
    let h = harness().await;

    let stale = Credential::oauth(
        h.owner_id.clone(),
        Provider::Google,
        "shop@gmail.com",
        "stale-token",
        Some("refresh".to_string()),
        Some(Utc::now() - chrono::Duration::minutes(10)),
    );
    h.credentials.upsert(&stale).await.unwrap();

    let service = aggregation(
        &h,
        vec![Arc::new(ScriptedProvider {
            kind: Provider::Google,
            behavior: Behavior::Healthy(vec![canonical("google_1", "ok", Provider::Google, 2)]),
        })],
    );

    let outcome = service.aggregate(&h.owner_id).await.unwrap();
    assert!(outcome.errors.is_empty());
    assert_eq!(h.refresher.refreshed.load(Ordering::SeqCst), 1);

    // The refreshed token landed in the database.
    let stored = h
        .credentials
        .list(&h.owner_id, Some(Provider::Google))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].access_token, "fresh-access");
    assert!(!stored[0].needs_refresh());
}

#[tokio::test]
async fn unrefreshable_credential_is_reported_as_account_error() {
    let h = harness().await;

    h.credentials
        .upsert(&Credential::oauth(
            h.owner_id.clone(),
            Provider::Google,
            "shop@gmail.com",
            "stale-token",
            Some("dead-refresh".to_string()),
            Some(Utc::now() - chrono::Duration::minutes(10)),
        ))
        .await
        .unwrap();

    let service = aggregation(
        &h,
        vec![Arc::new(ScriptedProvider {
            kind: Provider::Google,
            behavior: Behavior::Healthy(vec![]),
        })],
    );

    let outcome = service.aggregate(&h.owner_id).await.unwrap();
    assert!(outcome.messages.is_empty());
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].email, "shop@gmail.com");
    // The reason is the auth error's display, not the token material.
    assert!(!outcome.errors[0].reason.contains("stale-token"));
    assert!(!outcome.errors[0].reason.contains("dead-refresh"));
}

#[tokio::test]
async fn cross_source_duplicates_collapse_to_one() {
    let h = harness().await;

    h.credentials
        .upsert(&Credential::oauth(
            h.owner_id.clone(),
            Provider::Google,
            "shop@gmail.com",
            "live-token",
            Some("refresh".to_string()),
            Some(Utc::now() + chrono::Duration::hours(1)),
        ))
        .await
        .unwrap();
    h.credentials
        .upsert(&Credential::imap(
            h.owner_id.clone(),
            "shop@ovh.fr",
            "app-password",
            "ssl0.ovh.net",
            993,
        ))
        .await
        .unwrap();

    let service = aggregation(
        &h,
        vec![
            Arc::new(ScriptedProvider {
                kind: Provider::Google,
                behavior: Behavior::Healthy(vec![canonical(
                    "google_1",
                    "Votre avis compte",
                    Provider::Google,
                    2,
                )]),
            }),
            Arc::new(ScriptedProvider {
                kind: Provider::Imap,
                behavior: Behavior::Healthy(vec![canonical(
                    "imap_7_1714659200",
                    "Votre avis compte",
                    Provider::Imap,
                    2,
                )]),
            }),
        ],
    );

    let outcome = service.aggregate(&h.owner_id).await.unwrap();
    assert_eq!(outcome.stats.messages_fetched, 2);
    assert_eq!(outcome.messages.len(), 1);
}
