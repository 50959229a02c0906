//! Error types for the access-control layer

use thiserror::Error;

/// Result type alias for access-control operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// Failures reported by the credential provider.
///
/// All of these are recoverable: the caller shows a transient notification and the
/// session stays where it was.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("No account for {0}")]
    UserNotFound(String),

    #[error("Email already in use: {0}")]
    EmailInUse(String),

    #[error("Weak password: {0}")]
    WeakPassword(String),

    #[error("Sign-in popup was closed before completing")]
    PopupClosed,

    #[error("No signed-in user")]
    NoCurrentUser,

    #[error("Credential provider error: {0}")]
    Provider(String),
}

/// Error types for the access-control layer
#[derive(Error, Debug)]
pub enum AuthError {
    /// Credential provider rejected the operation
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Token verification did not confirm the session
    #[error("Verification failed: {0}")]
    Verification(String),

    /// Authentication failed (401)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authorization failed (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error (422)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Rate limit exceeded (429)
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Server error (5xx)
    #[error("Server error: {0}")]
    Server(String),

    /// The backend rejected the session; the caller should navigate to `redirect`
    #[error("Session expired, sign in again at {redirect}")]
    SessionExpired { redirect: String },

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Token storage failed
    #[error("Token storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl AuthError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::RateLimited | AuthError::Server(_))
    }

    /// Check if the error came from the credential provider
    pub fn is_credential(&self) -> bool {
        matches!(self, AuthError::Credential(_))
    }

    /// Create an error from an HTTP status code and message
    pub fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            401 => AuthError::Authentication(message),
            403 => AuthError::Forbidden(message),
            404 => AuthError::NotFound(message),
            422 => AuthError::Validation(message),
            429 => AuthError::RateLimited,
            500..=599 => AuthError::Server(message),
            _ => AuthError::Other(format!("HTTP {}: {}", status, message)),
        }
    }
}

impl From<std::io::Error> for AuthError {
    fn from(e: std::io::Error) -> Self {
        AuthError::Storage(e.to_string())
    }
}
