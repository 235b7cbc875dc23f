use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Envelope
///
/// The single body shape of every response: a `code` mirroring the HTTP status and either a
/// `payload` (success) or a `message` (failure). Success bodies always carry `payload`, even
/// when it is `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn success(payload: T) -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            payload: Some(payload),
            message: None,
        }
    }
}

impl Envelope<()> {
    pub fn failure(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code: status.as_u16(),
            payload: None,
            message: Some(message.into()),
        }
    }
}

/// Payload
///
/// Successful handler output. The value is serialized into an [`Envelope`] in one pass once
/// the handler has returned, so a body is never started before the outcome is known.
#[derive(Debug, Clone)]
pub struct Payload<T>(pub T);

/// The return type of every resource handler.
pub type ApiResult<T> = Result<Payload<T>, ApiError>;

impl<T: Serialize> IntoResponse for Payload<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&Envelope::success(self.0)) {
            Ok(body) => json_response(StatusCode::OK, body),
            Err(e) => {
                tracing::error!("failed to encode response payload: {}", e);
                ApiError::Encoding.into_response()
            }
        }
    }
}

/// Builds the error envelope for `status`. Encoding a unit envelope cannot fail, but the
/// fallback keeps this path free of panics.
pub(crate) fn failure_response(status: StatusCode, message: &str) -> Response {
    let body = serde_json::to_vec(&Envelope::failure(status, message)).unwrap_or_else(|_| {
        format!(r#"{{"code":{},"message":"internal error"}}"#, status.as_u16()).into_bytes()
    });
    json_response(status, body)
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}
