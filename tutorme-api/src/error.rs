use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tutorme_core::{ConflictKind, CoreError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    AuthenticationError(String),
    #[error("{0}")]
    AuthorizationError(String),
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    NotFoundError(String),
    #[error("Conflicting window: {0}")]
    ConflictError(ConflictKind),
    /// Partially applied write the client should know about.
    #[error("{0}")]
    ReconciliationError(String),
    #[error("{0}")]
    InternalServerError(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error_message) = match &self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, "unauthenticated", msg.clone()),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "validation", msg.clone()),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, "not-found", msg.clone()),
            AppError::ConflictError(kind) => (StatusCode::CONFLICT, kind.as_str(), self.to_string()),
            AppError::ReconciliationError(msg) => {
                tracing::error!("Reconciliation needed: {}", msg);
                (StatusCode::BAD_GATEWAY, "reconciliation", msg.clone())
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(msg) => AppError::ValidationError(msg),
            CoreError::ConflictError(kind) => AppError::ConflictError(kind),
            CoreError::NotFoundError(msg) => AppError::NotFoundError(msg),
            err @ CoreError::ReconciliationError { .. } => AppError::ReconciliationError(err.to_string()),
            CoreError::StoreError(err) => AppError::InternalServerError(err.to_string()),
        }
    }
}
