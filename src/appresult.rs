use std::collections::BTreeMap;

use axum::{extract::rejection::{JsonRejection, PathRejection}, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Field name to messages, rendered as `{"field": ["message", ...]}`.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

pub const NON_FIELD_ERRORS: &str = "non_field_errors";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid request: {0:?}")]
    Validation(FieldErrors),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_owned(), vec![message.into()]);
        Self::Validation(errors)
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("No {what} matches the given query."))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            AppError::Validation(errors) => json!(errors),
            AppError::Internal(err) => {
                tracing::error!("internal error: {err:?}");
                json!({ "detail": "Internal Server Error" })
            }
            other => json!({ "detail": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::field(NON_FIELD_ERRORS, rejection.body_text())
    }
}

/// Ids in routes are integers; anything else names no object.
impl From<PathRejection> for AppError {
    fn from(_: PathRejection) -> Self {
        Self::NotFound("Not found.".to_owned())
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self::Internal(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(sqlx::Error);
apperr_impl!(bcrypt::BcryptError);
apperr_impl!(tokio::task::JoinError);
apperr_impl!(time::error::ComponentRange);
apperr_impl!(serde_json::Error);
