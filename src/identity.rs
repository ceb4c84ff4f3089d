//! Client for the main application's identity and authorization endpoints.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::AuthError;

/// The authenticated user behind a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub team_id: String,
}

/// Resolves tokens and answers authorization questions.
///
/// Backed by the main application API in production and a stub in tests.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a client-supplied token to its principal.
    async fn resolve_token(&self, token: &str) -> Result<Principal, AuthError>;

    /// Collection ids the user currently has access to.
    async fn collection_ids(&self, user_id: &str) -> Result<Vec<String>, AuthError>;

    /// Whether the user may read the given collection right now.
    async fn can_read_collection(
        &self,
        user_id: &str,
        collection_id: &str,
    ) -> Result<bool, AuthError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// `IdentityProvider` over the application's internal HTTP API.
#[derive(Clone)]
pub struct HttpIdentityProvider {
    api_url: String,
    http: reqwest::Client,
}

/// Every endpoint wraps its result in a `data` envelope.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct AuthInfo {
    user: UserInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserInfo {
    id: String,
    team_id: String,
}

impl HttpIdentityProvider {
    pub fn new(api_url: &str) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn resolve_token(&self, token: &str) -> Result<Principal, AuthError> {
        let url = format!("{}/api/auth.info", self.api_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(?e, "auth.info request failed");
                AuthError::new("Authentication service unavailable")
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AuthError::new("Invalid or expired token"));
        }
        if !status.is_success() {
            tracing::error!(%status, "auth.info returned an error");
            return Err(AuthError::new("Authentication service unavailable"));
        }

        let body: ApiEnvelope<AuthInfo> = resp.json().await.map_err(|e| {
            tracing::error!(?e, "auth.info parse failed");
            AuthError::new("Authentication service unavailable")
        })?;

        Ok(Principal {
            id: body.data.user.id,
            team_id: body.data.user.team_id,
        })
    }

    async fn collection_ids(&self, user_id: &str) -> Result<Vec<String>, AuthError> {
        let url = format!("{}/api/collections.accessible", self.api_url);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "userId": user_id }))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(?e, "collections.accessible request failed");
                AuthError::new("Collection lookup failed")
            })?;

        if !resp.status().is_success() {
            tracing::error!(status = %resp.status(), "collections.accessible returned an error");
            return Err(AuthError::new("Collection lookup failed"));
        }

        let body: ApiEnvelope<Vec<String>> = resp.json().await.map_err(|e| {
            tracing::error!(?e, "collections.accessible parse failed");
            AuthError::new("Collection lookup failed")
        })?;

        Ok(body.data)
    }

    async fn can_read_collection(
        &self,
        user_id: &str,
        collection_id: &str,
    ) -> Result<bool, AuthError> {
        let url = format!("{}/api/collections.can_read", self.api_url);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "userId": user_id, "collectionId": collection_id }))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(?e, "collections.can_read request failed");
                AuthError::new("Authorization check failed")
            })?;

        if !resp.status().is_success() {
            tracing::error!(status = %resp.status(), "collections.can_read returned an error");
            return Err(AuthError::new("Authorization check failed"));
        }

        let body: ApiEnvelope<bool> = resp.json().await.map_err(|e| {
            tracing::error!(?e, "collections.can_read parse failed");
            AuthError::new("Authorization check failed")
        })?;

        Ok(body.data)
    }
}
