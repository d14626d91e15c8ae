use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::repo::RepoError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// Every expected failure the core can hand back to the transport layer.
/// `InvalidCredentials` is deliberately uniform across "unknown user" and
/// "wrong password", and `TokenInvalid` across signature/expiry/corruption/
/// version-mismatch, so callers cannot probe which case they hit.
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("invalid input")] InvalidInput,
    #[error("{0}")] WeakPassword(String),
    #[error("username already taken")] UsernameTaken,
    #[error("registration is disabled")] RegistrationDisabled,
    #[error("invalid username or password")] InvalidCredentials,
    #[error("too many failed attempts")] AccountLocked { remaining_secs: u64 },
    #[error("captcha verification failed")] ChallengeFailed,
    #[error("too many requests")] RateLimited,
    #[error("invalid or expired token")] TokenInvalid,
    #[error("not found")] NotFound,
    #[error("internal error")] Internal,
}

impl From<RepoError> for AuthError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => AuthError::NotFound,
            // The only unique constraint in the schema is the username column.
            RepoError::Conflict => AuthError::UsernameTaken,
            RepoError::Internal(msg) => {
                tracing::error!("store error: {msg}");
                AuthError::Internal
            }
        }
    }
}

impl ResponseError for AuthError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            AuthError::InvalidInput
            | AuthError::WeakPassword(_)
            | AuthError::ChallengeFailed => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials | AuthError::TokenInvalid => StatusCode::UNAUTHORIZED,
            AuthError::RegistrationDisabled => StatusCode::FORBIDDEN,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::UsernameTaken => StatusCode::CONFLICT,
            AuthError::AccountLocked { .. } => StatusCode::LOCKED,
            AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let retry_after_secs = match self {
            AuthError::AccountLocked { remaining_secs } => Some(*remaining_secs),
            _ => None,
        };
        HttpResponse::build(status).json(ApiErrorBody {
            error: self.to_string(),
            retry_after_secs,
        })
    }
}
