use hyper::StatusCode;
use thiserror::Error;
use tokio_rusqlite::rusqlite;

use shared::types::ErrorResponse;

pub type Result<T> = std::result::Result<T, AuthError>;

/// The error taxonomy every store / service call is normalized into before
/// it reaches a request handler.
///
/// Variants deliberately carry little payload: the response body only ever
/// shows the generic per-class message from [`AuthError::public_message`],
/// while internal detail is logged at the point of failure.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No such account / session / link.
    #[error("not found")]
    NotFound,

    /// Unique-constraint violation: duplicate platform link, duplicate
    /// account, or a racing create.  The loser of a racing create should
    /// re-fetch, not retry the create.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Missing / invalid / expired session on a protected route.
    #[error("unauthorized")]
    Unauthorized,

    /// Valid session lacking the required permission.
    #[error("forbidden")]
    Forbidden,

    /// Malformed OAuth state, nonce mismatch, unparseable payload.
    #[error("bad request")]
    BadRequest,

    /// Infrastructure-level store failure — distinguished from `NotFound`
    /// so callers can decide whether to fail open or closed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Anything else that should surface as a 500 (hashing failure, RNG
    /// exhaustion, serialization bugs).
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        AuthError::Conflict(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::Conflict(_) => StatusCode::CONFLICT,
            AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::BadRequest => StatusCode::BAD_REQUEST,
            AuthError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::NotFound => "NOT_FOUND",
            AuthError::Conflict(_) => "CONFLICT",
            AuthError::Unauthorized => "UNAUTHORIZED",
            AuthError::Forbidden => "FORBIDDEN",
            AuthError::BadRequest => "BAD_REQUEST",
            AuthError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// The message exposed in responses.  Never echoes internal error text.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::NotFound => "The requested record does not exist",
            AuthError::Conflict(_) => "The request conflicts with an existing record",
            AuthError::Unauthorized => "Authentication required",
            AuthError::Forbidden => "You do not have permission to do that",
            AuthError::BadRequest => "The request could not be processed",
            AuthError::StoreUnavailable(_) => "The service is temporarily unavailable",
            AuthError::Internal(_) => "An internal error occurred",
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::new(self.code(), self.public_message())
    }
}

/// Normalize store-layer errors.  Constraint violations become `Conflict`,
/// zero-row lookups become `NotFound`, everything else (closed connection,
/// I/O failure) is `StoreUnavailable`.
impl From<tokio_rusqlite::Error> for AuthError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::Error(rusqlite::Error::SqliteFailure(e, msg))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                AuthError::Conflict(msg.unwrap_or_else(|| "unique constraint violated".into()))
            }
            tokio_rusqlite::Error::Error(rusqlite::Error::QueryReturnedNoRows) => {
                AuthError::NotFound
            }
            other => AuthError::StoreUnavailable(other.to_string()),
        }
    }
}
