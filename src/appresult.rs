use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

/// Operation failures, split by what the caller can do about them.
/// Authorization and validation failures reject the single operation and
/// leave the connection alive; store failures fail writes outright; cache
/// failures never reach a caller (the read path absorbs them).
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not signed in")]
    Unauthenticated,
    #[error("not allowed")]
    Forbidden,
    #[error("{0}")]
    ValidationFailed(String),
    #[error("store unavailable: {0}")]
    Store(#[from] sqlx::Error),
    #[error("store timed out")]
    StoreTimeout,
    #[error("cache unavailable: {0}")]
    Cache(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable reason code carried in error responses and `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "unauthenticated",
            AppError::Forbidden => "forbidden",
            AppError::ValidationFailed(_) => "validation_failed",
            AppError::Store(_) | AppError::StoreTimeout => "store_unavailable",
            AppError::Cache(_) => "cache_unavailable",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Store(_) | AppError::StoreTimeout => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Cache(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(json!({ "error": self.code(), "message": self.to_string() })),
        )
            .into_response()
    }
}

macro_rules! internal_err_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self::Internal(anyhow::Error::from(err))
            }
        }
    };
}

internal_err_impl!(serde_json::Error);
internal_err_impl!(tower_sessions::session::Error);
internal_err_impl!(axum::Error);
internal_err_impl!(uuid::Error);
