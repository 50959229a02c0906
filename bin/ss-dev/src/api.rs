//! Harness HTTP endpoints over the session store and navigator

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use ss_auth::{
    post_sign_in_target, AuthError, CredentialError, GuardDecision, Navigator, SessionSnapshot,
    SessionStore, SignUpRequest,
};
use ss_common::{Identity, Role};
use tracing::info;

pub struct AppState {
    pub store: Arc<SessionStore>,
    pub navigator: Arc<Navigator>,
    pub after_sign_in: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/q/health", get(health))
        .route("/api/session", get(session))
        .route("/api/guard", get(guard))
        .route("/api/sign-up", post(sign_up))
        .route("/api/sign-in", post(sign_in))
        .route("/api/sign-out", post(sign_out))
        .route("/api/password-reset", post(password_reset))
        .with_state(Arc::new(state))
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

pub struct ApiError(AuthError);

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self.0 {
            AuthError::Credential(CredentialError::InvalidCredentials | CredentialError::UserNotFound(_)) => {
                (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS")
            }
            AuthError::Credential(CredentialError::EmailInUse(_)) => (StatusCode::CONFLICT, "DUPLICATE"),
            AuthError::Credential(CredentialError::WeakPassword(_)) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AuthError::Credential(_) => (StatusCode::BAD_REQUEST, "CREDENTIAL_ERROR"),
            AuthError::Verification(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AuthError::SessionExpired { .. } => (StatusCode::UNAUTHORIZED, "SESSION_EXPIRED"),
            AuthError::Server(_) | AuthError::Http(_) | AuthError::RateLimited => {
                (StatusCode::BAD_GATEWAY, "BACKEND_UNAVAILABLE")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    session_settled: bool,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "UP",
        session_settled: state.store.state().is_settled(),
    })
}

async fn session(State(state): State<Arc<AppState>>) -> Json<SessionSnapshot> {
    Json(state.store.snapshot())
}

#[derive(Deserialize)]
struct GuardQuery {
    path: String,
}

#[derive(Serialize)]
struct GuardResponse {
    path: String,
    generation: u64,
    #[serde(flatten)]
    decision: GuardDecision,
}

async fn guard(State(state): State<Arc<AppState>>, Query(query): Query<GuardQuery>) -> Json<GuardResponse> {
    let snapshot = state.store.snapshot();
    let decision = state.navigator.evaluate(&snapshot.state, &query.path);

    Json(GuardResponse {
        path: query.path,
        generation: snapshot.generation,
        decision,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpBody {
    name: String,
    email: String,
    password: String,
    #[serde(default, rename = "photoURL")]
    photo_url: Option<String>,
    #[serde(default = "default_role")]
    role: Role,
}

fn default_role() -> Role {
    Role::Student
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInBody {
    email: String,
    password: String,
    #[serde(default)]
    return_to: Option<String>,
}

#[derive(Serialize)]
struct SignedInResponse {
    identity: Identity,
    redirect: String,
}

async fn sign_up(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SignUpBody>,
) -> Result<Json<SignedInResponse>, ApiError> {
    let request = SignUpRequest {
        name: body.name,
        email: body.email,
        password: body.password,
        photo_url: body.photo_url,
        role: body.role,
    };
    let identity = state.store.sign_up(&request).await?;
    info!(role = %identity.role, "Signed up");

    Ok(Json(SignedInResponse {
        identity,
        redirect: state.after_sign_in.clone(),
    }))
}

async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SignInBody>,
) -> Result<Json<SignedInResponse>, ApiError> {
    let identity = state.store.sign_in(&body.email, &body.password).await?;
    let redirect = post_sign_in_target(body.return_to.as_deref(), &state.after_sign_in).to_string();

    Ok(Json(SignedInResponse { identity, redirect }))
}

async fn sign_out(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.store.sign_out().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct PasswordResetBody {
    email: String,
}

async fn password_reset(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PasswordResetBody>,
) -> Result<StatusCode, ApiError> {
    state.store.send_password_reset(&body.email).await?;
    Ok(StatusCode::ACCEPTED)
}
