use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{repository::StoreError, response::failure_response};

/// ApiError
///
/// Every failure is classified into exactly one of these kinds before it leaves a component.
/// The `Display` text is the message placed in the envelope, so it must stay short and never
/// carry identifiers or collaborator error details.
///
/// Cross-tenant access is reported as `NotFound`; `Forbidden` is reserved for callers inside
/// the right organization whose role lacks the required bit.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or invalid credentials")]
    Unauthenticated,
    #[error("{0}")]
    NotFound(&'static str),
    #[error("insufficient role for this operation")]
    Forbidden,
    #[error("a resource with this name already exists")]
    Conflict,
    #[error("{0}")]
    BadRequest(String),
    #[error("internal error")]
    StoreFault,
    #[error("internal error")]
    Encoding,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::StoreFault | ApiError::Encoding => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Classifies a store error for a lookup whose absence means `missing`.
    pub fn from_store(err: StoreError, missing: &'static str) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound(missing),
            other => other.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound("resource not found"),
            StoreError::Conflict => ApiError::Conflict,
            StoreError::Fault(detail) => {
                // The detail stays in the logs; the caller only sees the kind.
                tracing::error!(%detail, "data store fault");
                ApiError::StoreFault
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        // Serde's text can quote the offending input, so it only goes to the logs.
        tracing::debug!(detail = %rejection.body_text(), "rejected request body");
        ApiError::BadRequest("malformed request body".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        failure_response(self.status(), &self.to_string())
    }
}
