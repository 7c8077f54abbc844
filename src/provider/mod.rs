/// External account provider
///
/// Remote password change and session revocation. Calls are best effort:
/// their outcome is reported alongside the local result and never rolls a
/// committed local transition back.

mod http;

pub use http::HttpProvider;

use crate::{account::PasswordChange, metrics};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure talking to the provider
#[derive(Error, Debug)]
pub enum ProviderError {
    /// No provider endpoint is configured
    #[error("provider is not configured")]
    NotConfigured,

    /// The account has no API credential for the provider
    #[error("account {0} has no provider credential")]
    MissingCredential(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Result of one best-effort remote call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "lowercase")]
pub enum ProviderOutcome {
    /// Remote side applied the change
    Synced,
    /// Nothing to call (no endpoint or no credential)
    Skipped,
    /// Local state changed, remote sync failed
    Failed(String),
}

impl ProviderOutcome {
    pub fn from_result(result: Result<(), ProviderError>) -> Self {
        match result {
            Ok(()) => ProviderOutcome::Synced,
            Err(ProviderError::NotConfigured) | Err(ProviderError::MissingCredential(_)) => {
                ProviderOutcome::Skipped
            }
            Err(e) => ProviderOutcome::Failed(e.to_string()),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProviderOutcome::Synced => "synced",
            ProviderOutcome::Skipped => "skipped",
            ProviderOutcome::Failed(_) => "failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ProviderOutcome::Failed(_))
    }
}

/// Remote control over pooled accounts
#[async_trait]
pub trait AccountProvider: Send + Sync {
    async fn change_password(
        &self,
        login: &str,
        credential: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), ProviderError>;

    async fn revoke_sessions(&self, login: &str, credential: &str) -> Result<(), ProviderError>;
}

/// Provider used when no endpoint is configured; every call is skipped
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledProvider;

#[async_trait]
impl AccountProvider for DisabledProvider {
    async fn change_password(
        &self,
        _login: &str,
        _credential: &str,
        _old_password: &str,
        _new_password: &str,
    ) -> Result<(), ProviderError> {
        Err(ProviderError::NotConfigured)
    }

    async fn revoke_sessions(&self, _login: &str, _credential: &str) -> Result<(), ProviderError> {
        Err(ProviderError::NotConfigured)
    }
}

/// Push a committed password change to the provider
pub async fn sync_password(provider: &dyn AccountProvider, change: &PasswordChange) -> ProviderOutcome {
    let result = match change.provider_credential.as_deref() {
        Some(credential) => {
            provider
                .change_password(
                    &change.login,
                    credential,
                    &change.old_password,
                    &change.new_password,
                )
                .await
        }
        None => Err(ProviderError::MissingCredential(change.login.clone())),
    };

    finish("change_password", &change.login, result)
}

/// Log out every session on the account
pub async fn revoke_sessions(
    provider: &dyn AccountProvider,
    login: &str,
    credential: Option<&str>,
) -> ProviderOutcome {
    let result = match credential {
        Some(credential) => provider.revoke_sessions(login, credential).await,
        None => Err(ProviderError::MissingCredential(login.to_string())),
    };

    finish("revoke_sessions", login, result)
}

fn finish(operation: &str, login: &str, result: Result<(), ProviderError>) -> ProviderOutcome {
    let outcome = ProviderOutcome::from_result(result);
    match &outcome {
        ProviderOutcome::Failed(detail) => {
            warn!(login = %login, operation, "Provider call failed: {}", detail)
        }
        ProviderOutcome::Skipped => debug!(login = %login, operation, "Provider call skipped"),
        ProviderOutcome::Synced => debug!(login = %login, operation, "Provider call succeeded"),
    }
    metrics::record_provider_call(operation, outcome.label());
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(credential: Option<&str>) -> PasswordChange {
        PasswordChange {
            login: "steamuser1".to_string(),
            old_password: "pw1".to_string(),
            new_password: "Xy7!abcdefgh".to_string(),
            provider_credential: credential.map(str::to_string),
        }
    }

    struct RejectingProvider;

    #[async_trait]
    impl AccountProvider for RejectingProvider {
        async fn change_password(
            &self,
            _login: &str,
            _credential: &str,
            _old: &str,
            _new: &str,
        ) -> Result<(), ProviderError> {
            Err(ProviderError::Rejected {
                status: 403,
                body: "bad key".to_string(),
            })
        }

        async fn revoke_sessions(&self, _login: &str, _credential: &str) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_missing_credential_is_skipped() {
        let outcome = sync_password(&RejectingProvider, &change(None)).await;
        assert_eq!(outcome, ProviderOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_disabled_provider_is_skipped() {
        let outcome = sync_password(&DisabledProvider, &change(Some("key"))).await;
        assert_eq!(outcome, ProviderOutcome::Skipped);
        let outcome = revoke_sessions(&DisabledProvider, "steamuser1", Some("key")).await;
        assert_eq!(outcome, ProviderOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_rejection_is_reported_not_raised() {
        let outcome = sync_password(&RejectingProvider, &change(Some("key"))).await;
        assert!(outcome.is_failed());

        let outcome = revoke_sessions(&RejectingProvider, "steamuser1", Some("key")).await;
        assert_eq!(outcome, ProviderOutcome::Synced);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&ProviderOutcome::Failed("timeout".to_string())).unwrap();
        assert_eq!(json, r#"{"outcome":"failed","detail":"timeout"}"#);
    }
}
