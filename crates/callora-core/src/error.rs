//! Unified error handling for Callora
//!
//! This module provides a single error type covering every failure scenario
//! in the call lifecycle and billing engine, with automatic HTTP response
//! mapping and stable machine-readable codes the mobile client keys off.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Main application error type
///
/// All errors in the application should be converted to this type.
/// It implements `ResponseError` for automatic HTTP response generation.
///
/// Admission rejections deliberately carry vague human-readable text for the
/// privacy-sensitive causes: a blocked, suspended, or soft-deleted party all
/// surface as the same "unavailable" message.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Cache Errors ====================
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Cache connection failed: {0}")]
    CacheConnection(String),

    // ==================== Admission Rejections ====================
    #[error("Cannot call yourself")]
    SelfCall,

    #[error("User is unavailable")]
    UserUnavailable,

    #[error("User is offline")]
    UserOffline,

    #[error("User is on another call")]
    UserBusy,

    #[error("{0} calls are not enabled for this user")]
    CallTypeDisabled(String),

    #[error("Insufficient balance: required {required} coins, available {available}")]
    InsufficientBalance { required: i64, available: i64 },

    // ==================== Transition Errors ====================
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not authorized for this call session")]
    UnauthorizedActor,

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    // ==================== Resource Errors ====================
    #[error("Not found: {0}")]
    NotFound(String),

    // ==================== External Service Errors ====================
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation(_) | AppError::SelfCall => StatusCode::BAD_REQUEST,

            // 402 Payment Required
            AppError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,

            // 403 Forbidden
            AppError::UnauthorizedActor => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::NotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Conflict(_)
            | AppError::UserUnavailable
            | AppError::UserOffline
            | AppError::UserBusy
            | AppError::CallTypeDisabled(_) => StatusCode::CONFLICT,

            // 503 Service Unavailable
            AppError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the stable machine-readable code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Pool(_) => "POOL_ERROR",
            AppError::Transaction(_) => "TRANSACTION_ERROR",
            AppError::Cache(_) => "CACHE_ERROR",
            AppError::CacheConnection(_) => "CACHE_CONNECTION_ERROR",
            AppError::SelfCall => "SELF_CALL",
            AppError::UserUnavailable => "USER_UNAVAILABLE",
            AppError::UserOffline => "USER_OFFLINE",
            AppError::UserBusy => "USER_BUSY",
            AppError::CallTypeDisabled(_) => "CALL_TYPE_DISABLED",
            AppError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            AppError::Conflict(_) => "CONFLICT",
            AppError::UnauthorizedActor => "UNAUTHORIZED_ACTOR",
            AppError::Validation(_) => "VALIDATION",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            AppError::Internal(_) => "INTERNAL",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether the client may safely retry the same request.
    ///
    /// Admission rejections and conflicts are terminal for the attempt; the
    /// client must re-fetch session state instead of looping. Infrastructure
    /// failures and credential-issuer timeouts are retryable.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Pool(_)
                | AppError::Transaction(_)
                | AppError::Cache(_)
                | AppError::CacheConnection(_)
                | AppError::BackendUnavailable(_)
                | AppError::Internal(_)
        )
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
            "retryable": self.retryable(),
        });

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
