//! Shared test doubles for the session lifecycle

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use ss_auth::{
    AuthError, CredentialProvider, Credentials, IdentitySubscription, MemoryCredentialProvider,
    MemoryTokenStore, OAuthProvider, ProfileUpdate, Result, SaveUserRequest, SavedUser,
    SessionState, SessionStore, TokenStore, TokenVerifier, UserDirectory, Verification,
};
use ss_common::{ProviderIdentity, Role, UserRecord};

pub fn provider_identity(email: &str) -> ProviderIdentity {
    ProviderIdentity {
        uid: format!("uid-{}", email.split('@').next().unwrap_or("user")),
        email: email.to_string(),
        display_name: Some("Provider Name".to_string()),
        photo_url: None,
    }
}

pub fn record(email: &str, role: Role) -> UserRecord {
    UserRecord {
        name: Some("Backend Name".to_string()),
        image: None,
        email: email.to_string(),
        role,
    }
}

/// In-process stand-in for the application backend: upserts records and issues
/// tokens on `save_user`, looks them up on `verify`.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<BackendState>,
}

#[derive(Default)]
struct BackendState {
    users: HashMap<String, UserRecord>,
    tokens: HashMap<String, String>,
    issued: u64,
    requests: Vec<SaveUserRequest>,
    verified: Vec<Option<String>>,
    reject_exchange: bool,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_user(self: Arc<Self>, email: &str, role: Role) -> Arc<Self> {
        self.state
            .lock()
            .users
            .insert(email.to_ascii_lowercase(), record(email, role));
        self
    }

    /// Register `token` as a valid token for `email`
    pub fn with_token(self: Arc<Self>, token: &str, email: &str) -> Arc<Self> {
        self.state.lock().tokens.insert(token.to_string(), email.to_ascii_lowercase());
        self
    }

    pub fn reject_exchange(&self) {
        self.state.lock().reject_exchange = true;
    }

    pub fn save_requests(&self) -> Vec<SaveUserRequest> {
        self.state.lock().requests.clone()
    }

    pub fn verified_tokens(&self) -> Vec<Option<String>> {
        self.state.lock().verified.clone()
    }
}

#[async_trait]
impl UserDirectory for FakeBackend {
    async fn save_user(&self, request: &SaveUserRequest) -> Result<SavedUser> {
        let mut state = self.state.lock();
        state.requests.push(request.clone());
        if state.reject_exchange {
            return Err(AuthError::Server("exchange unavailable".into()));
        }

        let key = request.email.to_ascii_lowercase();
        let user = state
            .users
            .entry(key.clone())
            .or_insert_with(|| UserRecord {
                name: request.name.clone(),
                image: request.image.clone(),
                email: request.email.clone(),
                role: request.role.unwrap_or(Role::Student),
            })
            .clone();

        state.issued += 1;
        let token = format!("token-{}", state.issued);
        state.tokens.insert(token.clone(), key);

        Ok(SavedUser { token, user })
    }
}

#[async_trait]
impl TokenVerifier for FakeBackend {
    async fn verify(&self, token: Option<&str>) -> Verification {
        let mut state = self.state.lock();
        state.verified.push(token.map(String::from));

        let record = token
            .and_then(|t| state.tokens.get(t))
            .and_then(|email| state.users.get(email))
            .cloned();

        match record {
            Some(record) => Verification::valid(record),
            None => Verification::invalid(),
        }
    }
}

/// Verifier that rejects everything, as when the backend is unreachable
pub struct RejectingVerifier;

#[async_trait]
impl TokenVerifier for RejectingVerifier {
    async fn verify(&self, _token: Option<&str>) -> Verification {
        Verification::invalid()
    }
}

/// Verifier whose answers are released one call at a time by the test
#[derive(Default)]
pub struct GatedVerifier {
    gates: Mutex<VecDeque<oneshot::Receiver<Verification>>>,
}

impl GatedVerifier {
    /// Queue a gate for the next call; send on the returned sender to release it
    pub fn gate(&self) -> oneshot::Sender<Verification> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().push_back(rx);
        tx
    }
}

#[async_trait]
impl TokenVerifier for GatedVerifier {
    async fn verify(&self, _token: Option<&str>) -> Verification {
        let gate = self.gates.lock().pop_front();
        match gate {
            Some(gate) => gate.await.unwrap_or_default(),
            None => Verification::invalid(),
        }
    }
}

/// Provider whose `sign_out` waits for the test to open a gate before it
/// takes effect. Everything else goes straight to the wrapped provider.
pub struct GatedSignOutProvider {
    inner: Arc<MemoryCredentialProvider>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    sign_outs: Mutex<usize>,
}

impl GatedSignOutProvider {
    /// Returns the provider and the sender that releases its next sign-out
    pub fn new(inner: Arc<MemoryCredentialProvider>) -> (Arc<Self>, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        let provider = Arc::new(Self {
            inner,
            gate: Mutex::new(Some(rx)),
            sign_outs: Mutex::new(0),
        });
        (provider, tx)
    }

    pub fn sign_outs(&self) -> usize {
        *self.sign_outs.lock()
    }
}

#[async_trait]
impl CredentialProvider for GatedSignOutProvider {
    fn on_identity_change(&self) -> IdentitySubscription {
        self.inner.on_identity_change()
    }

    fn current_identity(&self) -> Option<ProviderIdentity> {
        self.inner.current_identity()
    }

    async fn create_user(&self, credentials: &Credentials) -> Result<ProviderIdentity> {
        self.inner.create_user(credentials).await
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<ProviderIdentity> {
        self.inner.sign_in(credentials).await
    }

    async fn sign_in_with_popup(&self, provider: OAuthProvider) -> Result<ProviderIdentity> {
        self.inner.sign_in_with_popup(provider).await
    }

    async fn sign_out(&self) -> Result<()> {
        *self.sign_outs.lock() += 1;
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.inner.sign_out().await
    }

    async fn send_password_reset(&self, email: &str) -> Result<()> {
        self.inner.send_password_reset(email).await
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<ProviderIdentity> {
        self.inner.update_profile(update).await
    }
}

pub struct Harness {
    pub provider: Arc<MemoryCredentialProvider>,
    pub tokens: Arc<MemoryTokenStore>,
    pub store: Arc<SessionStore>,
}

pub fn harness(
    provider: MemoryCredentialProvider,
    verifier: Arc<dyn TokenVerifier>,
    directory: Arc<dyn UserDirectory>,
    tokens: MemoryTokenStore,
) -> Harness {
    let provider = Arc::new(provider);
    let tokens = Arc::new(tokens);
    let store = Arc::new(SessionStore::new(
        provider.clone() as Arc<dyn CredentialProvider>,
        verifier,
        directory,
        tokens.clone() as Arc<dyn TokenStore>,
    ));

    Harness { provider, tokens, store }
}

/// Wait for a state matching `predicate`, failing the test after a second
pub async fn wait_for_state<F>(store: &SessionStore, predicate: F) -> SessionState
where
    F: Fn(&SessionState) -> bool,
{
    let mut rx = store.subscribe();
    let result = tokio::time::timeout(Duration::from_secs(1), async {
        rx.wait_for(|snapshot| predicate(&snapshot.state))
            .await
            .map(|snapshot| snapshot.state.clone())
    })
    .await;

    match result {
        Ok(Ok(state)) => state,
        _ => panic!("timed out waiting for session state, last: {:?}", store.state()),
    }
}
