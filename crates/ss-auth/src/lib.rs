//! # SessionSync Auth
//!
//! Session lifecycle and role-gated access control for the study-session platform.
//!
//! ## Features
//!
//! - **Session Store**: Generation-tagged state machine that follows a credential
//!   provider and settles `Authenticated(role)` or `Anonymous`, failing closed
//! - **Token Verifier**: The sole source of roles, backed by `GET /verify-token`
//! - **Route Guard / Role Gate**: Pure decisions over settled session state
//! - **Route table**: The platform's public, private and role-gated routes
//! - **Secure client**: Bearer-authenticated backend calls that sign out on 401/403
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ss_auth::{
//!     ApiClient, HttpTokenVerifier, MemoryCredentialProvider, MemoryTokenStore, SessionStore,
//! };
//!
//! # async fn example() -> ss_auth::Result<()> {
//! let api = ApiClient::new(&ss_config::ApiConfig::default())?;
//! let store = Arc::new(SessionStore::new(
//!     Arc::new(MemoryCredentialProvider::new()),
//!     Arc::new(HttpTokenVerifier::new(api.clone())),
//!     Arc::new(api),
//!     Arc::new(MemoryTokenStore::new()),
//! ));
//!
//! let handle = store.start();
//! let state = store.wait_settled().await;
//! println!("settled: {:?}", state);
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod api;
pub mod error;
pub mod guard;
pub mod provider;
pub mod routes;
pub mod secure;
pub mod session;
pub mod token_store;
pub mod verifier;

pub use account::{validate_password, SignUpRequest};
pub use api::{ApiClient, SaveUserRequest, SavedUser, UserDirectory, VerifyTokenResponse};
pub use error::{AuthError, CredentialError, Result};
pub use guard::{
    decide, post_sign_in_target, GuardDecision, Redirect, RedirectTargets, RoleGate, RouteGuard,
    RoutePolicy,
};
pub use provider::{
    CredentialProvider, Credentials, IdentityBroadcaster, IdentityEvent, IdentitySubscription,
    MemoryCredentialProvider, OAuthProvider, ProfileUpdate,
};
pub use routes::{NavigationContext, Navigator, RouteAccess, RouteMatch, RouteTable};
pub use secure::SecureClient;
pub use session::{SessionHandle, SessionSnapshot, SessionState, SessionStore};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use verifier::{HttpTokenVerifier, TokenVerifier, Verification};
