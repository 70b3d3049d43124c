//! API error types and HTTP status mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::idempotency::IdempotencyError;
use crate::interfaces::provider::ProviderError;
use crate::services::{PaymentError, RefundError};

/// API result type.
pub type ApiResult<T> = Result<T, ApiError>;

/// API-facing errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Input violates a stated invariant.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Missing or bad credential, or invalid webhook signature.
    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// Credential known but inactive or lacking permission.
    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    /// Entity absent, or owned by another merchant (indistinguishable).
    #[error("Resource not found")]
    NotFound,

    /// Same idempotency key, different fingerprint; or request in flight.
    #[error("Idempotency conflict: {message}")]
    IdempotencyConflict { message: String },

    /// Merchant quota exceeded.
    #[error("Rate limited")]
    RateLimited,

    /// Remote processor returned an error.
    #[error("Provider error: {message}")]
    Provider { code: String, message: String },

    /// Breaker rejected the call; transient provider outage.
    #[error("Provider temporarily unavailable")]
    CircuitOpen,

    /// Anything else.
    #[error("Internal error")]
    Internal { message: String },
}

/// Error response body.
#[derive(Serialize)]
pub struct ErrorResponse {
    /// Short error name.
    pub error: String,
    /// Human-readable message.
    pub message: String,
    /// Stable machine code.
    pub code: String,
    /// Optional structured details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::IdempotencyConflict { .. } => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Provider { .. } => StatusCode::BAD_GATEWAY,
            ApiError::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            ApiError::Validation { .. } => "VALIDATION_ERROR",
            ApiError::Unauthorized { .. } => "UNAUTHORIZED",
            ApiError::Forbidden { .. } => "FORBIDDEN",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::IdempotencyConflict { .. } => "IDEMPOTENCY_CONFLICT",
            ApiError::RateLimited => "RATE_LIMITED",
            ApiError::Provider { code, .. } => code,
            ApiError::CircuitOpen => "CIRCUIT_OPEN",
            ApiError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    fn public_message(&self) -> String {
        match self {
            // Server faults get a generic message; the request id on the
            // response header is the support handle.
            ApiError::Internal { .. } => {
                "An internal error occurred. Contact support with the request id.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal { message } = &self {
            tracing::error!(error = %message, "Internal error");
        }

        let status = self.status_code();
        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("error")
                .to_ascii_lowercase(),
            message: self.public_message(),
            code: self.code().to_string(),
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

impl From<PaymentError> for ApiError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::Validation(message) => ApiError::Validation { message },
            PaymentError::NotFound => ApiError::NotFound,
            PaymentError::DuplicateExternalId(id) => ApiError::Validation {
                message: format!("external_id already used: {id}"),
            },
            PaymentError::Provider(ProviderError::UnknownProvider(name)) => {
                ApiError::Validation {
                    message: format!("provider not registered: {name}"),
                }
            }
            PaymentError::Provider(inner) => ApiError::Provider {
                code: inner.code().to_string(),
                message: inner.to_string(),
            },
            PaymentError::CircuitOpen(_) => ApiError::CircuitOpen,
            PaymentError::ProviderTimeout(message) => ApiError::Provider {
                code: "PROVIDER_TIMEOUT".to_string(),
                message,
            },
            PaymentError::Storage(e) => ApiError::Internal {
                message: e.to_string(),
            },
        }
    }
}

impl From<RefundError> for ApiError {
    fn from(e: RefundError) -> Self {
        match e {
            RefundError::Validation(message) => ApiError::Validation { message },
            RefundError::PaymentNotFound | RefundError::RefundNotFound => ApiError::NotFound,
            RefundError::Provider(inner) => ApiError::Provider {
                code: inner.code().to_string(),
                message: inner.to_string(),
            },
            RefundError::Storage(e) => ApiError::Internal {
                message: e.to_string(),
            },
        }
    }
}

impl From<IdempotencyError> for ApiError {
    fn from(e: IdempotencyError) -> Self {
        match e {
            IdempotencyError::Conflict => ApiError::IdempotencyConflict {
                message: "idempotency key reused with a different request".to_string(),
            },
            IdempotencyError::Storage(e) => ApiError::Internal {
                message: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (
                ApiError::Validation {
                    message: "bad".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Unauthorized {
                    reason: "no key".into(),
                },
                StatusCode::UNAUTHORIZED,
            ),
            (
                ApiError::Forbidden {
                    reason: "inactive".into(),
                },
                StatusCode::FORBIDDEN,
            ),
            (ApiError::NotFound, StatusCode::NOT_FOUND),
            (
                ApiError::IdempotencyConflict {
                    message: "reused".into(),
                },
                StatusCode::CONFLICT,
            ),
            (ApiError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (
                ApiError::Provider {
                    code: "card_declined".into(),
                    message: "declined".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (ApiError::CircuitOpen, StatusCode::SERVICE_UNAVAILABLE),
            (
                ApiError::Internal {
                    message: "boom".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.status_code(), status, "{error}");
        }
    }

    #[test]
    fn test_internal_message_is_generic() {
        let error = ApiError::Internal {
            message: "connection pool exhausted on 10.0.0.3".into(),
        };
        assert!(!error.public_message().contains("10.0.0.3"));
    }

    #[test]
    fn test_idempotency_conflict_code() {
        let error: ApiError = IdempotencyError::Conflict.into();
        assert_eq!(error.code(), "IDEMPOTENCY_CONFLICT");
        assert_eq!(error.status_code(), StatusCode::CONFLICT);
    }
}
