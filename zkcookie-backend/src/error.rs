use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::{challenge::ChallengeError, session::SessionError, verify::VerifyError};

pub const CODE_INVALID_BODY: &str = "invalid_body";
pub const CODE_MISSING_HOST: &str = "missing_host";
pub const CODE_INVALID_HOST: &str = "invalid_host";
pub const CODE_INVALID_MASK: &str = "invalid_mask";
pub const CODE_NO_SESSION: &str = "no_session";
pub const CODE_BAD_SESSION_SIG: &str = "bad_session_sig";
pub const CODE_BAD_SESSION_PAYLOAD: &str = "bad_session_payload";
pub const CODE_SESSION_EXPIRED: &str = "session_expired";
pub const CODE_SERVER_ERROR: &str = "server_error";

/// Error returned by every handler. Clients only ever see the code; the
/// message goes to the log.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, CODE_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<VerifyError> for ApiError {
    fn from(err: VerifyError) -> Self {
        let status = match &err {
            VerifyError::UnsupportedLayout(_) | VerifyError::InvalidSignals(_) => {
                StatusCode::BAD_REQUEST
            }
            VerifyError::NonceInvalid => StatusCode::GONE,
            VerifyError::OriginMismatch => StatusCode::FORBIDDEN,
            VerifyError::MaskMismatch => StatusCode::PRECONDITION_FAILED,
            VerifyError::InvalidProof => StatusCode::UNPROCESSABLE_ENTITY,
            VerifyError::NullifierReplay => StatusCode::CONFLICT,
            VerifyError::VerifierNotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            VerifyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.code(), err.to_string())
    }
}

impl From<ChallengeError> for ApiError {
    fn from(err: ChallengeError) -> Self {
        match err {
            ChallengeError::InvalidHost(_) => Self::bad_request(CODE_INVALID_HOST, err.to_string()),
            ChallengeError::InvalidMask(_) => Self::bad_request(CODE_INVALID_MASK, err.to_string()),
            ChallengeError::NotFoundOrExpired | ChallengeError::Storage(_) => {
                Self::internal(err.to_string())
            }
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let code = match err {
            SessionError::Malformed | SessionError::BadSignature => CODE_BAD_SESSION_SIG,
            SessionError::MalformedPayload(_) => CODE_BAD_SESSION_PAYLOAD,
            SessionError::Expired => CODE_SESSION_EXPIRED,
            SessionError::Encode(_) => return Self::internal(err.to_string()),
        };
        Self::unauthorized(code, err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    ok: bool,
    error: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, code = self.code, reason = %self.message, "request failed");
        } else {
            tracing::debug!(status = %self.status, code = self.code, reason = %self.message, "request rejected");
        }
        let body = ErrorResponse {
            ok: false,
            error: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}
