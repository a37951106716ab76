//! Crate-wide error taxonomy, mapped to HTTP responses at the handler boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    ValidationFailed(String),

    #[error("{0}")]
    AuthInvalid(String),

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Too many auth attempts")]
    RateLimited,

    #[error("Order signature does not recover to authenticated EOA for either regular or neg-risk exchange contract")]
    OrderSignatureMismatch,

    #[error("{0}")]
    CredentialDerivationFailed(String),

    #[error("{0}")]
    CredentialPayloadInvalid(String),

    #[error("{message}")]
    UpstreamApiError { status: u16, message: String },

    #[error("{0}")]
    InternalError(String),
}

impl AppError {
    pub fn upstream(status: u16, mut message: String) -> Self {
        let status = status.clamp(400, 599);
        if message.contains("Invalid order payload") {
            message.push_str(
                ". Check token tradability, price tick-size, signatureType, and exchange contract (regular vs neg-risk).",
            );
        }
        AppError::UpstreamApiError { status, message }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            AppError::AuthInvalid(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::OrderSignatureMismatch => StatusCode::BAD_REQUEST,
            AppError::CredentialDerivationFailed(_) => StatusCode::BAD_REQUEST,
            AppError::CredentialPayloadInvalid(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamApiError { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST)
            }
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if matches!(self, AppError::InternalError(_)) {
            tracing::error!(error = %self, "internal error");
        }
        let status = self.status_code();
        let detail = self.to_string();
        (status, Json(ErrorBody { detail })).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
