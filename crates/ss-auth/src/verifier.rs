//! Token Verifier
//!
//! The only place a role is resolved. Verification is a pure read on the backend and
//! never fails loudly: network and server errors come back as an invalid
//! verification so the Session Store alone decides the resulting transition.

use async_trait::async_trait;
use ss_common::UserRecord;
use tracing::warn;

use crate::api::ApiClient;

/// Outcome of a token check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verification {
    pub is_valid: bool,
    pub record: Option<UserRecord>,
}

impl Verification {
    pub fn valid(record: UserRecord) -> Self {
        Self {
            is_valid: true,
            record: Some(record),
        }
    }

    pub fn invalid() -> Self {
        Self::default()
    }

    /// The record, if and only if the backend vouched for it
    pub fn confirmed_record(&self) -> Option<&UserRecord> {
        if self.is_valid {
            self.record.as_ref()
        } else {
            None
        }
    }
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Check `token` against the backend. An absent token never verifies.
    async fn verify(&self, token: Option<&str>) -> Verification;
}

/// Verifier backed by `GET /verify-token/{token}`
#[derive(Debug, Clone)]
pub struct HttpTokenVerifier {
    api: ApiClient,
}

impl HttpTokenVerifier {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl TokenVerifier for HttpTokenVerifier {
    async fn verify(&self, token: Option<&str>) -> Verification {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return Verification::invalid();
        };

        match self.api.verify_token(token).await {
            Ok(response) => Verification {
                is_valid: response.is_valid,
                record: response.user,
            },
            Err(e) => {
                warn!(error = %e, "Token verification failed, treating token as invalid");
                Verification::invalid()
            }
        }
    }
}
