//! Credential Provider adapter
//!
//! The access-control layer only needs a small capability set from an identity
//! provider: an identity-change event stream plus sign-in, sign-out, popup sign-in
//! and password reset. Any provider implementing [`CredentialProvider`] is
//! interchangeable.
//!
//! Identity changes are delivered over an explicit channel. Subscribing returns an
//! [`IdentitySubscription`] which immediately yields the provider's current identity
//! (the initial check on process start) and then every change, in order. Dropping or
//! calling [`IdentitySubscription::unsubscribe`] detaches it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use ss_common::ProviderIdentity;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{CredentialError, Result};

/// Identity-change event. `None` means nobody is signed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityEvent {
    pub identity: Option<ProviderIdentity>,
}

/// Third-party sign-in providers offered through a popup flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OAuthProvider {
    Google,
    GitHub,
}

/// Email/password credentials
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Profile fields a signed-in user may change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Capabilities required from an identity provider
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Subscribe to identity changes
    fn on_identity_change(&self) -> IdentitySubscription;

    /// Identity currently signed in with the provider
    fn current_identity(&self) -> Option<ProviderIdentity>;

    /// Create an email/password account and sign it in
    async fn create_user(&self, credentials: &Credentials) -> Result<ProviderIdentity>;

    async fn sign_in(&self, credentials: &Credentials) -> Result<ProviderIdentity>;

    async fn sign_in_with_popup(&self, provider: OAuthProvider) -> Result<ProviderIdentity>;

    async fn sign_out(&self) -> Result<()>;

    async fn send_password_reset(&self, email: &str) -> Result<()>;

    /// Update the signed-in user's profile. Does not emit an identity-change event.
    async fn update_profile(&self, update: &ProfileUpdate) -> Result<ProviderIdentity>;
}

// ============================================================================
// Event channel
// ============================================================================

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    senders: HashMap<u64, mpsc::UnboundedSender<IdentityEvent>>,
}

/// Fan-out of identity events to every live subscription.
///
/// Emission happens under one lock, so each subscriber sees events in emission order.
#[derive(Clone, Default)]
pub struct IdentityBroadcaster {
    inner: Arc<Mutex<Subscribers>>,
}

impl IdentityBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber and deliver `current` as its first event
    pub fn subscribe(&self, current: Option<ProviderIdentity>) -> IdentitySubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.inner.lock();

        let id = subscribers.next_id;
        subscribers.next_id += 1;
        let _ = tx.send(IdentityEvent { identity: current });
        subscribers.senders.insert(id, tx);

        IdentitySubscription {
            id,
            receiver: rx,
            registry: Arc::downgrade(&self.inner),
        }
    }

    pub fn emit(&self, identity: Option<ProviderIdentity>) {
        let mut subscribers = self.inner.lock();
        let event = IdentityEvent { identity };
        subscribers
            .senders
            .retain(|_, tx| tx.send(event.clone()).is_ok());
        debug!(subscribers = subscribers.senders.len(), signed_in = event.identity.is_some(), "Identity change emitted");
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().senders.len()
    }
}

/// Receiving end of an identity-change subscription
pub struct IdentitySubscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<IdentityEvent>,
    registry: Weak<Mutex<Subscribers>>,
}

impl IdentitySubscription {
    /// Wait for the next event. Returns `None` once the provider is gone.
    pub async fn recv(&mut self) -> Option<IdentityEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<IdentityEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn unsubscribe(self) {}
}

impl Drop for IdentitySubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().senders.remove(&self.id);
        }
    }
}

// ============================================================================
// In-memory provider
// ============================================================================

const MIN_PROVIDER_PASSWORD_LEN: usize = 6;

struct Account {
    password: String,
    identity: ProviderIdentity,
}

/// Credential provider backed by process memory.
///
/// Used by the development harness and tests. Behaves like a hosted identity
/// provider: creating an account signs it in, profile updates are silent.
#[derive(Default)]
pub struct MemoryCredentialProvider {
    accounts: Mutex<HashMap<String, Account>>,
    popup_identities: Mutex<HashMap<OAuthProvider, ProviderIdentity>>,
    current: Mutex<Option<ProviderIdentity>>,
    reset_requests: Mutex<Vec<String>>,
    events: IdentityBroadcaster,
}

impl MemoryCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an email/password account
    pub fn with_account(self, email: &str, password: &str, display_name: Option<&str>) -> Self {
        let identity = ProviderIdentity {
            uid: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            display_name: display_name.map(String::from),
            photo_url: None,
        };
        self.accounts.lock().insert(
            email.to_ascii_lowercase(),
            Account {
                password: password.to_string(),
                identity,
            },
        );
        self
    }

    /// Identity returned when the popup flow for `provider` completes
    pub fn with_popup_identity(self, provider: OAuthProvider, identity: ProviderIdentity) -> Self {
        self.popup_identities.lock().insert(provider, identity);
        self
    }

    /// Replace the signed-in identity from outside (e.g. expiry in another tab)
    pub fn set_identity(&self, identity: Option<ProviderIdentity>) {
        *self.current.lock() = identity.clone();
        self.events.emit(identity);
    }

    /// Emails that password resets were sent to
    pub fn password_resets(&self) -> Vec<String> {
        self.reset_requests.lock().clone()
    }

    fn sign_in_as(&self, identity: ProviderIdentity) -> ProviderIdentity {
        self.set_identity(Some(identity.clone()));
        identity
    }
}

#[async_trait]
impl CredentialProvider for MemoryCredentialProvider {
    fn on_identity_change(&self) -> IdentitySubscription {
        self.events.subscribe(self.current_identity())
    }

    fn current_identity(&self) -> Option<ProviderIdentity> {
        self.current.lock().clone()
    }

    async fn create_user(&self, credentials: &Credentials) -> Result<ProviderIdentity> {
        if credentials.password.chars().count() < MIN_PROVIDER_PASSWORD_LEN {
            return Err(CredentialError::WeakPassword(format!(
                "at least {} characters required",
                MIN_PROVIDER_PASSWORD_LEN
            ))
            .into());
        }

        let key = credentials.email.to_ascii_lowercase();
        let identity = {
            let mut accounts = self.accounts.lock();
            if accounts.contains_key(&key) {
                return Err(CredentialError::EmailInUse(credentials.email.clone()).into());
            }
            let identity = ProviderIdentity {
                uid: uuid::Uuid::new_v4().to_string(),
                email: credentials.email.clone(),
                display_name: None,
                photo_url: None,
            };
            accounts.insert(
                key,
                Account {
                    password: credentials.password.clone(),
                    identity: identity.clone(),
                },
            );
            identity
        };

        Ok(self.sign_in_as(identity))
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<ProviderIdentity> {
        let identity = {
            let accounts = self.accounts.lock();
            let account = accounts
                .get(&credentials.email.to_ascii_lowercase())
                .ok_or_else(|| CredentialError::UserNotFound(credentials.email.clone()))?;
            if account.password != credentials.password {
                return Err(CredentialError::InvalidCredentials.into());
            }
            account.identity.clone()
        };

        Ok(self.sign_in_as(identity))
    }

    async fn sign_in_with_popup(&self, provider: OAuthProvider) -> Result<ProviderIdentity> {
        let identity = self
            .popup_identities
            .lock()
            .get(&provider)
            .cloned()
            .ok_or(CredentialError::PopupClosed)?;

        Ok(self.sign_in_as(identity))
    }

    async fn sign_out(&self) -> Result<()> {
        self.set_identity(None);
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<()> {
        if !self.accounts.lock().contains_key(&email.to_ascii_lowercase()) {
            return Err(CredentialError::UserNotFound(email.to_string()).into());
        }
        self.reset_requests.lock().push(email.to_string());
        Ok(())
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<ProviderIdentity> {
        let mut current = self.current.lock();
        let identity = current.as_mut().ok_or(CredentialError::NoCurrentUser)?;

        if let Some(name) = &update.display_name {
            identity.display_name = Some(name.clone());
        }
        if let Some(photo) = &update.photo_url {
            identity.photo_url = Some(photo.clone());
        }

        if let Some(account) = self.accounts.lock().get_mut(&identity.email.to_ascii_lowercase()) {
            account.identity = identity.clone();
        }

        Ok(identity.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;

    fn popup_identity() -> ProviderIdentity {
        ProviderIdentity {
            uid: "google-1".to_string(),
            email: "grace@example.com".to_string(),
            display_name: Some("Grace".to_string()),
            photo_url: Some("https://lh3.example.com/grace.png".to_string()),
        }
    }

    #[tokio::test]
    async fn test_subscription_starts_with_current_identity() {
        let provider = MemoryCredentialProvider::new();
        let mut sub = provider.on_identity_change();

        assert_eq!(sub.recv().await, Some(IdentityEvent { identity: None }));
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let provider = MemoryCredentialProvider::new().with_account("ada@example.com", "Secret1", Some("Ada"));
        let mut sub = provider.on_identity_change();
        sub.recv().await;

        provider.sign_in(&Credentials::new("ada@example.com", "Secret1")).await.unwrap();
        provider.sign_out().await.unwrap();

        let first = sub.recv().await.unwrap();
        assert_eq!(first.identity.unwrap().email, "ada@example.com");
        assert_eq!(sub.recv().await.unwrap().identity, None);
    }

    #[tokio::test]
    async fn test_unsubscribe_detaches() {
        let provider = MemoryCredentialProvider::new();
        let sub = provider.on_identity_change();
        assert_eq!(provider.events.subscriber_count(), 1);

        sub.unsubscribe();
        assert_eq!(provider.events.subscriber_count(), 0);
        provider.sign_out().await.unwrap();
    }

    #[tokio::test]
    async fn test_sign_in_errors() {
        let provider = MemoryCredentialProvider::new().with_account("ada@example.com", "Secret1", None);

        let wrong = provider.sign_in(&Credentials::new("ada@example.com", "nope")).await;
        assert!(matches!(wrong, Err(AuthError::Credential(CredentialError::InvalidCredentials))));

        let unknown = provider.sign_in(&Credentials::new("bob@example.com", "Secret1")).await;
        assert!(matches!(unknown, Err(AuthError::Credential(CredentialError::UserNotFound(_)))));
        assert!(provider.current_identity().is_none());
    }

    #[tokio::test]
    async fn test_create_user_rejects_duplicates() {
        let provider = MemoryCredentialProvider::new().with_account("ada@example.com", "Secret1", None);
        let result = provider.create_user(&Credentials::new("ADA@example.com", "Secret2")).await;
        assert!(matches!(result, Err(AuthError::Credential(CredentialError::EmailInUse(_)))));
    }

    #[tokio::test]
    async fn test_popup_sign_in() {
        let provider = MemoryCredentialProvider::new().with_popup_identity(OAuthProvider::Google, popup_identity());

        let identity = provider.sign_in_with_popup(OAuthProvider::Google).await.unwrap();
        assert_eq!(identity.uid, "google-1");

        let closed = provider.sign_in_with_popup(OAuthProvider::GitHub).await;
        assert!(matches!(closed, Err(AuthError::Credential(CredentialError::PopupClosed))));
    }

    #[tokio::test]
    async fn test_profile_update_is_silent() {
        let provider = MemoryCredentialProvider::new().with_popup_identity(OAuthProvider::Google, popup_identity());
        provider.sign_in_with_popup(OAuthProvider::Google).await.unwrap();

        let mut sub = provider.on_identity_change();
        sub.recv().await;

        let updated = provider
            .update_profile(&ProfileUpdate {
                display_name: Some("Grace H.".to_string()),
                photo_url: None,
            })
            .await
            .unwrap();

        assert_eq!(updated.display_name.as_deref(), Some("Grace H."));
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let debug = format!("{:?}", Credentials::new("ada@example.com", "Secret1"));
        assert!(!debug.contains("Secret1"));
    }
}
