/// HTTP bridge to the account provider
use super::{AccountProvider, ProviderError};
use crate::error::{RentalError, RentalResult};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::json;
use std::time::Duration;

/// Calls `POST {base}/accounts/{login}/password` and
/// `POST {base}/accounts/{login}/sessions/revoke`, authenticated with the
/// account's own credential as a bearer token
#[derive(Clone)]
pub struct HttpProvider {
    http_client: Client,
    base_url: Url,
}

impl HttpProvider {
    pub fn new(base_url: &str, timeout: Duration) -> RentalResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| RentalError::Validation(format!("Invalid provider URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RentalError::Validation(format!(
                "Provider URL cannot be a base: {}",
                base_url
            )));
        }

        let http_client = Client::builder()
            .user_agent(concat!("rental-pool/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| RentalError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    fn endpoint(&self, login: &str, tail: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ProviderError::NotConfigured)?;
            segments.pop_if_empty().push("accounts").push(login).extend(tail);
        }
        Ok(url)
    }

    async fn post(&self, url: Url, credential: &str, body: serde_json::Value) -> Result<(), ProviderError> {
        let response = self
            .http_client
            .post(url)
            .bearer_auth(credential)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl AccountProvider for HttpProvider {
    async fn change_password(
        &self,
        login: &str,
        credential: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), ProviderError> {
        let url = self.endpoint(login, &["password"])?;
        self.post(
            url,
            credential,
            json!({
                "old_password": old_password,
                "new_password": new_password,
            }),
        )
        .await
    }

    async fn revoke_sessions(&self, login: &str, credential: &str) -> Result<(), ProviderError> {
        let url = self.endpoint(login, &["sessions", "revoke"])?;
        self.post(url, credential, json!({})).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_escapes_login() {
        let provider = HttpProvider::new("http://127.0.0.1:9000/api/", Duration::from_secs(1)).unwrap();

        let url = provider.endpoint("user name/1", &["password"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9000/api/accounts/user%20name%2F1/password"
        );

        let url = provider.endpoint("a", &["sessions", "revoke"]).unwrap();
        assert_eq!(url.path(), "/api/accounts/a/sessions/revoke");
    }

    #[test]
    fn test_rejects_invalid_base() {
        assert!(HttpProvider::new("not a url", Duration::from_secs(1)).is_err());
        assert!(HttpProvider::new("mailto:ops@example.com", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_transport_error() {
        let provider = HttpProvider::new("http://127.0.0.1:1", Duration::from_millis(500)).unwrap();
        let err = provider.revoke_sessions("a", "key").await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport(_)));
    }
}
