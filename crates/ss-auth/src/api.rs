//! Application backend client
//!
//! Two calls matter to the session lifecycle:
//! - `POST /users` upserts the user record after a credential exchange and returns
//!   `{token, user}`.
//! - `GET /verify-token/{token}` confirms a stored token and returns the
//!   authoritative record. It is a pure read.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use ss_common::{ProviderIdentity, Role, UserRecord};
use ss_config::{ApiConfig, MAX_RETRY_ATTEMPTS};
use tracing::{debug, warn};

use crate::error::{AuthError, Result};

/// Body of `POST /users`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveUserRequest {
    pub name: Option<String>,
    pub image: Option<String>,
    pub email: String,
    /// Requested role; only sent on sign-up. The backend decides what is stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl SaveUserRequest {
    pub fn from_identity(identity: &ProviderIdentity, role: Option<Role>) -> Self {
        Self {
            name: identity.display_name.clone(),
            image: identity.photo_url.clone(),
            email: identity.email.clone(),
            role,
        }
    }
}

/// Response of `POST /users`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SavedUser {
    pub token: String,
    pub user: UserRecord,
}

/// Response of `GET /verify-token/{token}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTokenResponse {
    pub is_valid: bool,
    #[serde(default)]
    pub user: Option<UserRecord>,
}

/// Exchanges a provider identity for a backend token and user record
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn save_user(&self, request: &SaveUserRequest) -> Result<SavedUser>;
}

/// HTTP client for the application backend
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http_client: reqwest::Client,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http_client,
            retry_attempts: config.retry_attempts.clamp(1, MAX_RETRY_ATTEMPTS),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request builder for a backend path (no authentication attached)
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.http_client.request(method, url)
    }

    pub async fn save_user(&self, request: &SaveUserRequest) -> Result<SavedUser> {
        let request = self
            .request(reqwest::Method::POST, "/users")
            .json(request)
            .build()?;
        self.execute(request).await
    }

    pub async fn verify_token(&self, token: &str) -> Result<VerifyTokenResponse> {
        let path = format!("/verify-token/{}", urlencoding::encode(token));
        let request = self.request(reqwest::Method::GET, &path).build()?;
        self.execute(request).await
    }

    /// Delay before retry `attempt`, doubling from `retry_delay` and saturating
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.retry_delay.saturating_mul(factor)
    }

    /// Execute a request with retries on transient failures
    pub async fn execute<T>(&self, request: reqwest::Request) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let mut last_error = None;

        for attempt in 0..self.retry_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.backoff(attempt)).await;
            }

            let request = request
                .try_clone()
                .ok_or_else(|| AuthError::Other("Request cannot be cloned".into()))?;

            match self.http_client.execute(request).await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: T = response
                            .json()
                            .await
                            .map_err(|e| AuthError::Http(e.without_url()))?;
                        return Ok(body);
                    }

                    let body = response.text().await.unwrap_or_default();
                    let error = AuthError::from_status(status, body);

                    if !error.is_retryable() {
                        return Err(error);
                    }

                    debug!(attempt, status = %status, "Retryable backend response");
                    last_error = Some(error);
                }
                Err(e) => {
                    // URLs may embed the session token
                    let e = e.without_url();
                    warn!(attempt, error = %e, "Backend request failed");
                    last_error = Some(AuthError::Http(e));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AuthError::Other("Request failed".into())))
    }
}

#[async_trait]
impl UserDirectory for ApiClient {
    async fn save_user(&self, request: &SaveUserRequest) -> Result<SavedUser> {
        ApiClient::save_user(self, request).await
    }
}
