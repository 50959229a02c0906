//! Authenticated backend requests
//!
//! Attaches the stored session token as a bearer token. A 401 or 403 means the
//! backend no longer honours the session: sign out and send the user to sign-in.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::error::{AuthError, Result};
use crate::session::SessionStore;

pub struct SecureClient {
    api: ApiClient,
    store: Arc<SessionStore>,
    sign_in_path: String,
}

impl SecureClient {
    pub fn new(api: ApiClient, store: Arc<SessionStore>, sign_in_path: impl Into<String>) -> Self {
        Self {
            api,
            store,
            sign_in_path: sign_in_path.into(),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let builder = self.authorized(reqwest::Method::GET, path)?;
        self.send(builder).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let builder = self.authorized(reqwest::Method::POST, path)?.json(body);
        self.send(builder).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let builder = self.authorized(reqwest::Method::DELETE, path)?;
        self.send(builder).await
    }

    fn authorized(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder> {
        let builder = self.api.request(method, path);
        Ok(match self.store.tokens.load()? {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn send<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder) -> Result<T> {
        let request = builder.build()?;
        let path = request.url().path().to_string();

        match self.api.execute(request).await {
            Err(AuthError::Authentication(_) | AuthError::Forbidden(_)) => {
                info!(path = %path, "Backend refused the session, signing out");
                if let Err(e) = self.store.sign_out().await {
                    warn!(error = %e, "Sign-out after refused request failed");
                }
                Err(AuthError::SessionExpired {
                    redirect: self.sign_in_path.clone(),
                })
            }
            other => other,
        }
    }
}
