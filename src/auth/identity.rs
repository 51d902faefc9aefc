use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::config::IdentityConfig;

/// Account as known to the identity provider
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("user already registered: {0}")]
    AlreadyRegistered(String),
    #[error("identity provider not configured: {0}")]
    NotConfigured(&'static str),
    #[error("identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("identity provider returned {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Password authentication and account administration
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError>;
    async fn create_user(&self, email: &str, password: &str) -> Result<Identity, IdentityError>;
    async fn delete_user(&self, id: Uuid) -> Result<(), IdentityError>;
}

/// Identity provider backed by the BaaS auth REST API
pub struct BaasIdentity {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    service_key: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    user: Identity,
}

impl BaasIdentity {
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            service_key: config.service_key.clone(),
        }
    }

    fn require_url(&self) -> Result<(), IdentityError> {
        if self.base_url.is_empty() {
            return Err(IdentityError::NotConfigured("IDENTITY_URL"));
        }
        Ok(())
    }

    fn require_service_key(&self) -> Result<&str, IdentityError> {
        self.require_url()?;
        if self.service_key.is_empty() {
            return Err(IdentityError::NotConfigured("IDENTITY_SERVICE_KEY"));
        }
        Ok(&self.service_key)
    }

    async fn rejected(response: reqwest::Response) -> IdentityError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        IdentityError::Rejected { status, message }
    }
}

#[async_trait]
impl IdentityProvider for BaasIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        self.require_url()?;
        let response = self
            .client
            .post(format!("{}/auth/v1/token?grant_type=password", self.base_url))
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(response.json::<TokenResponse>().await?.user),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => Err(IdentityError::InvalidCredentials),
            _ => Err(Self::rejected(response).await),
        }
    }

    async fn create_user(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let key = self.require_service_key()?;
        let response = self
            .client
            .post(format!("{}/auth/v1/admin/users", self.base_url))
            .header("apikey", key)
            .bearer_auth(key)
            .json(&json!({ "email": email, "password": password, "email_confirm": true }))
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(response.json::<Identity>().await?),
            StatusCode::UNPROCESSABLE_ENTITY | StatusCode::CONFLICT => {
                Err(IdentityError::AlreadyRegistered(email.to_string()))
            }
            _ => Err(Self::rejected(response).await),
        }
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), IdentityError> {
        let key = self.require_service_key()?;
        let response = self
            .client
            .delete(format!("{}/auth/v1/admin/users/{}", self.base_url, id))
            .header("apikey", key)
            .bearer_auth(key)
            .send()
            .await?;

        // Already gone upstream is fine
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(Self::rejected(response).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_provider_fails_fast() {
        let provider = BaasIdentity::new(&IdentityConfig {
            url: String::new(),
            anon_key: String::new(),
            service_key: String::new(),
        });
        assert!(matches!(
            provider.sign_in("a@example.com", "pw").await,
            Err(IdentityError::NotConfigured("IDENTITY_URL"))
        ));
    }

    #[tokio::test]
    async fn admin_calls_need_service_key() {
        let provider = BaasIdentity::new(&IdentityConfig {
            url: "http://localhost:1".to_string(),
            anon_key: "anon".to_string(),
            service_key: String::new(),
        });
        assert!(matches!(
            provider.delete_user(Uuid::new_v4()).await,
            Err(IdentityError::NotConfigured("IDENTITY_SERVICE_KEY"))
        ));
    }
}
