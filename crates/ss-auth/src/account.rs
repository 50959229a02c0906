//! Account operations on the Session Store
//!
//! Sign-up, sign-in and popup sign-in all end the same way: exchange the provider
//! identity for a backend token, persist it, then re-run verification so the role
//! comes from the verified record.

use std::fmt;

use ss_common::{Identity, ProviderIdentity, Role};
use tracing::{info, warn};

use crate::api::SaveUserRequest;
use crate::error::{AuthError, CredentialError, Result};
use crate::provider::{Credentials, OAuthProvider, ProfileUpdate};
use crate::session::{SessionState, SessionStore};

const MIN_PASSWORD_LEN: usize = 6;

/// New account details
#[derive(Clone)]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub photo_url: Option<String>,
    /// Role requested on the sign-up form; the backend has the final say
    pub role: Role,
}

impl fmt::Debug for SignUpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignUpRequest")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("photo_url", &self.photo_url)
            .field("role", &self.role)
            .finish()
    }
}

/// At least six characters with one uppercase and one lowercase letter
pub fn validate_password(password: &str) -> Result<()> {
    let long_enough = password.chars().count() >= MIN_PASSWORD_LEN;
    let has_upper = password.chars().any(char::is_uppercase);
    let has_lower = password.chars().any(char::is_lowercase);

    if long_enough && has_upper && has_lower {
        Ok(())
    } else {
        Err(CredentialError::WeakPassword(format!(
            "must be at least {} characters long and include an uppercase and a lowercase letter",
            MIN_PASSWORD_LEN
        ))
        .into())
    }
}

impl SessionStore {
    pub async fn sign_up(&self, request: &SignUpRequest) -> Result<Identity> {
        validate_password(&request.password)?;

        // Creating the account emits an identity change; its exchange must carry the role too
        *self.pending_role.lock() = Some(request.role);
        let result = self.create_account(request).await;
        *self.pending_role.lock() = None;
        result
    }

    async fn create_account(&self, request: &SignUpRequest) -> Result<Identity> {
        self.provider
            .create_user(&Credentials::new(&request.email, &request.password))
            .await?;

        let identity = self
            .provider
            .update_profile(&ProfileUpdate {
                display_name: Some(request.name.clone()),
                photo_url: request.photo_url.clone(),
            })
            .await?;

        info!(role = %request.role, "Account created");
        self.complete_sign_in(&identity, Some(request.role)).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let identity = self.provider.sign_in(&Credentials::new(email, password)).await?;
        self.complete_sign_in(&identity, None).await
    }

    pub async fn sign_in_with_popup(&self, provider: OAuthProvider) -> Result<Identity> {
        let identity = self.provider.sign_in_with_popup(provider).await?;
        self.complete_sign_in(&identity, None).await
    }

    /// Sign out of the provider and settle `Anonymous`.
    ///
    /// The local session is cleared even when the provider call fails.
    pub async fn sign_out(&self) -> Result<()> {
        let result = self.provider.sign_out().await;
        if let Err(e) = &result {
            warn!(error = %e, "Credential sign-out failed, clearing local session anyway");
        }

        if let Err(e) = self.tokens.clear() {
            warn!(error = %e, "Failed to clear session token");
        }
        self.handle_identity_change(None).await;

        result
    }

    pub async fn send_password_reset(&self, email: &str) -> Result<()> {
        self.provider.send_password_reset(email).await
    }

    /// Update display name and photo. The role is untouched.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Identity> {
        let profile = self.provider.update_profile(update).await?;

        self.amend_identity(|identity| {
            identity.display_name = profile.display_name.clone();
            identity.photo_url = profile.photo_url.clone();
        })
        .ok_or_else(|| CredentialError::NoCurrentUser.into())
    }

    async fn complete_sign_in(&self, identity: &ProviderIdentity, role: Option<Role>) -> Result<Identity> {
        let request = SaveUserRequest::from_identity(identity, role);
        let saved = match self.directory.save_user(&request).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!(error = %e, "Credential exchange failed after sign-in");
                let _ = self.sign_out().await;
                return Err(e);
            }
        };

        self.tokens.save(&saved.token)?;
        self.refresh().await;

        match self.wait_settled().await {
            SessionState::Authenticated(identity) => Ok(identity),
            _ => Err(AuthError::Verification("backend did not confirm the session".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_rules() {
        assert!(validate_password("Secret").is_ok());
        assert!(validate_password("Sec1").is_err());
        assert!(validate_password("secret1").is_err());
        assert!(validate_password("SECRET1").is_err());
    }

    #[test]
    fn test_sign_up_request_debug_hides_password() {
        let request = SignUpRequest {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            password: "Secret1".to_string(),
            photo_url: None,
            role: Role::Tutor,
        };
        assert!(!format!("{:?}", request).contains("Secret1"));
    }
}
