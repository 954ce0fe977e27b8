//! Error handling for the bridge service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{service} error ({status}): {message}")]
    Upstream {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("checkbox signin: {message}")]
    FiscalAuth { message: String },

    #[error("shift open failed: {message}")]
    FiscalShift { message: String },

    #[error("receipt submit failed: {message}")]
    FiscalSubmit { message: String },

    #[error("{message}")]
    Validation { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    pub fn upstream(service: &'static str, status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            status,
            message: message.into(),
        }
    }

    pub fn fiscal_auth(message: impl Into<String>) -> Self {
        Self::FiscalAuth {
            message: message.into(),
        }
    }

    pub fn fiscal_shift(message: impl Into<String>) -> Self {
        Self::FiscalShift {
            message: message.into(),
        }
    }

    pub fn fiscal_submit(message: impl Into<String>) -> Self {
        Self::FiscalSubmit {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            AppError::FiscalAuth { .. } => StatusCode::BAD_GATEWAY,
            AppError::FiscalShift { .. } => StatusCode::BAD_GATEWAY,
            AppError::FiscalSubmit { .. } => StatusCode::BAD_GATEWAY,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
            AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Upstream { .. } => "UPSTREAM_ERROR",
            AppError::FiscalAuth { .. } => "FISCAL_AUTH_ERROR",
            AppError::FiscalShift { .. } => "FISCAL_SHIFT_ERROR",
            AppError::FiscalSubmit { .. } => "FISCAL_SUBMIT_ERROR",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::Configuration { .. } => "CONFIG_ERROR",
            AppError::HttpClient(_) => "HTTP_CLIENT_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_response = ErrorResponse {
            error: self.error_code().to_string(),
            message: self.to_string(),
            code: status.as_u16().to_string(),
        };

        tracing::error!("API Error: {} - {}", self.error_code(), self);

        (status, Json(error_response)).into_response()
    }
}
