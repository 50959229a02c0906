//! Session Store
//!
//! Single authoritative answer to "who is signed in, and with what role".
//!
//! ```text
//! Unknown ──┐
//! Authenticated(role) ──┼── identity change ──> Loading ──┬──> Authenticated(role)
//! Anonymous ──┘                                       └──> Anonymous
//! ```
//!
//! Every identity-change event bumps a monotonic generation and publishes `Loading`.
//! Resolution runs asynchronously; only the resolution for the latest generation may
//! settle state, so a slow stale verification can never overwrite a fresher result.
//! Network failures resolve to `Anonymous` (fail closed), never to `Authenticated`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use ss_common::{Identity, ProviderIdentity, Role};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{SaveUserRequest, UserDirectory};
use crate::provider::CredentialProvider;
use crate::token_store::TokenStore;
use crate::verifier::TokenVerifier;

/// Session lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "identity", rename_all = "snake_case")]
pub enum SessionState {
    Unknown,
    Loading,
    Authenticated(Identity),
    Anonymous,
}

impl SessionState {
    /// Any state other than `Unknown`/`Loading`
    pub fn is_settled(&self) -> bool {
        matches!(self, SessionState::Authenticated(_) | SessionState::Anonymous)
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.identity().map(|identity| identity.role)
    }
}

/// The one live session record, replaced wholesale on every transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub generation: u64,
    pub state: SessionState,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnonymousReason {
    SignedOut,
    TokenRejected,
    RecordMismatch,
    ExchangeFailed,
    StorageFailed,
}

impl AnonymousReason {
    fn as_str(&self) -> &'static str {
        match self {
            AnonymousReason::SignedOut => "signed_out",
            AnonymousReason::TokenRejected => "token_rejected",
            AnonymousReason::RecordMismatch => "record_mismatch",
            AnonymousReason::ExchangeFailed => "exchange_failed",
            AnonymousReason::StorageFailed => "storage_failed",
        }
    }

    /// The provider still holds an identity the backend would not vouch for
    fn forces_sign_out(&self) -> bool {
        !matches!(self, AnonymousReason::SignedOut)
    }
}

enum Resolution {
    Authenticated { identity: Identity, token: String },
    Anonymous(AnonymousReason),
}

/// Where the token being verified came from
#[derive(Debug, Clone, Copy)]
enum TokenSource {
    Stored,
    Issued,
}

/// Owner of the session lifecycle.
///
/// Construct once at process start and share by `Arc`.
pub struct SessionStore {
    pub(crate) provider: Arc<dyn CredentialProvider>,
    verifier: Arc<dyn TokenVerifier>,
    pub(crate) directory: Arc<dyn UserDirectory>,
    pub(crate) tokens: Arc<dyn TokenStore>,
    /// Role requested by a sign-up in progress, sent with any credential exchange
    pub(crate) pending_role: Mutex<Option<Role>>,
    generation: Mutex<u64>,
    state_tx: watch::Sender<SessionSnapshot>,
}

impl SessionStore {
    pub fn new(
        provider: Arc<dyn CredentialProvider>,
        verifier: Arc<dyn TokenVerifier>,
        directory: Arc<dyn UserDirectory>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionSnapshot {
            generation: 0,
            state: SessionState::Unknown,
            updated_at: Utc::now(),
        });

        Self {
            provider,
            verifier,
            directory,
            tokens,
            pending_role: Mutex::new(None),
            generation: Mutex::new(0),
            state_tx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().state.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state_tx.subscribe()
    }

    /// Latest generation handed out
    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Wait until the store leaves `Unknown`/`Loading`.
    ///
    /// Never returns if no identity-change event is ever processed.
    pub async fn wait_settled(&self) -> SessionState {
        let mut rx = self.state_tx.subscribe();
        let settled = rx
            .wait_for(|snapshot| snapshot.state.is_settled())
            .await
            .map(|snapshot| snapshot.state.clone());

        match settled {
            Ok(state) => state,
            Err(_) => self.state(),
        }
    }

    /// Start a new generation and publish `Loading`
    pub fn begin(&self) -> u64 {
        let mut generation = self.generation.lock();
        *generation += 1;
        let current = *generation;
        self.publish(current, SessionState::Loading);
        current
    }

    /// Process one identity-change event to completion
    pub async fn handle_identity_change(&self, identity: Option<ProviderIdentity>) -> bool {
        let generation = self.begin();
        self.resolve(generation, identity).await
    }

    /// Re-run resolution for the provider's current identity
    pub async fn refresh(&self) -> bool {
        let identity = self.provider.current_identity();
        self.handle_identity_change(identity).await
    }

    /// Resolve `identity` for `generation` and settle if it is still the latest.
    ///
    /// Returns `false` when a newer generation superseded this one.
    pub async fn resolve(&self, generation: u64, identity: Option<ProviderIdentity>) -> bool {
        let evaluated_uid = identity.as_ref().map(|identity| identity.uid.clone());
        let resolution = self.evaluate(identity).await;

        if !self.is_current(generation) {
            debug!(generation, latest = self.generation(), "Discarding stale session resolution");
            return false;
        }

        match resolution {
            Resolution::Authenticated { identity, token } => {
                if let Err(e) = self.tokens.save(&token) {
                    warn!(error = %e, "Failed to persist session token");
                }

                let role = identity.role;
                let settled = self.settle(generation, SessionState::Authenticated(identity));
                if settled {
                    info!(generation, role = %role, "Session authenticated");
                }
                settled
            }
            Resolution::Anonymous(reason) => {
                if reason.forces_sign_out() && !self.force_sign_out(generation, evaluated_uid.as_deref()).await {
                    return false;
                }

                self.settle_anonymous(generation, reason)
            }
        }
    }

    /// Sign the provider out of the identity `generation` rejected.
    ///
    /// Returns `false` when a newer generation started while the sign-out was in
    /// flight. In that case the provider may have lost an identity the newer
    /// generation relies on, so the session is settled `Anonymous` afresh.
    async fn force_sign_out(&self, generation: u64, evaluated_uid: Option<&str>) -> bool {
        let current_uid = self.provider.current_identity().map(|identity| identity.uid);
        if current_uid.as_deref() != evaluated_uid {
            debug!(generation, "Provider identity changed, skipping forced sign-out");
            return true;
        }

        if let Err(e) = self.provider.sign_out().await {
            warn!(error = %e, "Forced credential sign-out failed");
        }

        if self.is_current(generation) {
            return true;
        }

        debug!(generation, latest = self.generation(), "Forced sign-out overlapped a newer generation");
        if self.provider.current_identity().is_none() {
            let latest = self.begin();
            self.settle_anonymous(latest, AnonymousReason::SignedOut);
        }
        false
    }

    fn settle_anonymous(&self, generation: u64, reason: AnonymousReason) -> bool {
        if !self.is_current(generation) {
            debug!(generation, "Discarding stale session resolution");
            return false;
        }

        if let Err(e) = self.tokens.clear() {
            warn!(error = %e, "Failed to clear session token");
        }

        let settled = self.settle(generation, SessionState::Anonymous);
        if settled {
            info!(generation, reason = reason.as_str(), "Session anonymous");
        }
        settled
    }

    async fn evaluate(&self, identity: Option<ProviderIdentity>) -> Resolution {
        let Some(identity) = identity else {
            return Resolution::Anonymous(AnonymousReason::SignedOut);
        };

        let stored = match self.tokens.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to read session token");
                return Resolution::Anonymous(AnonymousReason::StorageFailed);
            }
        };

        let (token, source) = match stored {
            Some(token) => (token, TokenSource::Stored),
            // First sign-in on this client: no token has been issued yet
            None => {
                let role = *self.pending_role.lock();
                let request = SaveUserRequest::from_identity(&identity, role);
                match self.directory.save_user(&request).await {
                    Ok(saved) => (saved.token, TokenSource::Issued),
                    Err(e) => {
                        warn!(error = %e, "Credential exchange failed");
                        return Resolution::Anonymous(AnonymousReason::ExchangeFailed);
                    }
                }
            }
        };

        let verification = self.verifier.verify(Some(&token)).await;
        match verification.confirmed_record() {
            Some(record) if record.email.eq_ignore_ascii_case(&identity.email) => {
                debug!(?source, "Token verified");
                Resolution::Authenticated {
                    identity: Identity::merge(&identity, record),
                    token,
                }
            }
            Some(_) => {
                warn!(?source, "Verified record belongs to a different account");
                Resolution::Anonymous(AnonymousReason::RecordMismatch)
            }
            None => {
                debug!(?source, "Token rejected");
                Resolution::Anonymous(AnonymousReason::TokenRejected)
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        *self.generation.lock() == generation
    }

    fn settle(&self, generation: u64, state: SessionState) -> bool {
        let latest = self.generation.lock();
        if *latest != generation {
            debug!(generation, latest = *latest, "Discarding stale settlement");
            return false;
        }
        self.publish(generation, state);
        true
    }

    /// Apply `change` to the live identity without starting a new generation
    pub(crate) fn amend_identity<F>(&self, change: F) -> Option<Identity>
    where
        F: FnOnce(&mut Identity),
    {
        let generation = self.generation.lock();
        let mut identity = self.state_tx.borrow().state.identity()?.clone();
        change(&mut identity);
        self.publish(*generation, SessionState::Authenticated(identity.clone()));
        Some(identity)
    }

    fn publish(&self, generation: u64, state: SessionState) {
        self.state_tx.send_replace(SessionSnapshot {
            generation,
            state,
            updated_at: Utc::now(),
        });
    }

    /// Follow the credential provider's identity stream in a background task.
    ///
    /// Each event starts a generation immediately; its resolution runs on its own task
    /// so a newer event is never queued behind a slow verification.
    pub fn start(self: &Arc<Self>) -> SessionHandle {
        let mut subscription = self.provider.on_identity_change();
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
        let store = Arc::clone(self);

        let task = tokio::spawn(async move {
            info!("Session store listening for identity changes");

            loop {
                tokio::select! {
                    event = subscription.recv() => {
                        let Some(event) = event else {
                            info!("Credential provider closed the identity stream");
                            break;
                        };

                        let generation = store.begin();
                        debug!(generation, signed_in = event.identity.is_some(), "Identity change received");

                        let resolver = Arc::clone(&store);
                        tokio::spawn(async move {
                            resolver.resolve(generation, event.identity).await;
                        });
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Session store shutting down");
                        break;
                    }
                }
            }

            subscription.unsubscribe();
        });

        SessionHandle { shutdown_tx, task }
    }
}

/// Handle to the background task started by [`SessionStore::start`]
pub struct SessionHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Stop following identity changes and wait for the task to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.task.await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
