use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BalanceEngineError>;

#[derive(Error, Debug)]
pub enum BalanceEngineError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unauthorized access")]
    Unauthorized,

    #[error("Request timed out")]
    Timeout,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<ledger_core::Error> for BalanceEngineError {
    fn from(err: ledger_core::Error) -> Self {
        use ledger_core::Error;

        match err {
            Error::NotFound(msg) => BalanceEngineError::NotFound(msg),
            Error::Forbidden(msg) => BalanceEngineError::Forbidden(msg),
            Error::BadRequest(msg) => BalanceEngineError::Validation(msg),
            Error::Timeout(_) => BalanceEngineError::Timeout,
            other => BalanceEngineError::Internal(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for BalanceEngineError {
    fn from(err: validator::ValidationErrors) -> Self {
        BalanceEngineError::Validation(err.to_string())
    }
}

impl ResponseError for BalanceEngineError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        // Backend details stay in the logs
        let error_message = match self {
            BalanceEngineError::Database(_)
            | BalanceEngineError::Migration(_)
            | BalanceEngineError::Redis(_)
            | BalanceEngineError::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        HttpResponse::build(status_code).json(json!({
            "error": {
                "code": status_code.as_u16(),
                "message": error_message,
                "type": self.error_type()
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            BalanceEngineError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BalanceEngineError::Migration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BalanceEngineError::Redis(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BalanceEngineError::Validation(_) => StatusCode::BAD_REQUEST,
            BalanceEngineError::NotFound(_) => StatusCode::NOT_FOUND,
            BalanceEngineError::Forbidden(_) => StatusCode::FORBIDDEN,
            BalanceEngineError::Unauthorized => StatusCode::UNAUTHORIZED,
            BalanceEngineError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            BalanceEngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl BalanceEngineError {
    fn error_type(&self) -> &str {
        match self {
            BalanceEngineError::Database(_) => "database_error",
            BalanceEngineError::Migration(_) => "database_error",
            BalanceEngineError::Redis(_) => "cache_error",
            BalanceEngineError::Validation(_) => "validation_error",
            BalanceEngineError::NotFound(_) => "not_found",
            BalanceEngineError::Forbidden(_) => "forbidden",
            BalanceEngineError::Unauthorized => "unauthorized",
            BalanceEngineError::Timeout => "timeout",
            BalanceEngineError::Internal(_) => "internal_error",
        }
    }
}
