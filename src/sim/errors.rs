// Simulator error taxonomy and HTTP mappings

use thiserror::Error;

/// Errors surfaced to callers of the intent service.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("payment intent not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl SimError {
    /// Stable error code used in the HTTP error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            SimError::Validation(_) => "VALIDATION_FAILED",
            SimError::NotFound(_) => "NOT_FOUND",
            SimError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Map to an HTTP status code at the boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            SimError::Validation(_) => 400,
            SimError::NotFound(_) => 404,
            SimError::Internal(_) => 500,
        }
    }
}

/// Failure of a single webhook delivery attempt. Never propagates past the
/// dispatcher; it only drives the retry decision and the failure reason label.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP {0}")]
    Status(u16),
    #[error("network error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("payload serialization failed: {0}")]
    Payload(String),
}

impl DeliveryError {
    /// Short reason tag used in logs, mirroring the delivery result labels.
    pub fn reason(&self) -> String {
        match self {
            DeliveryError::Status(code) => format!("http_{code}"),
            DeliveryError::Transport(_) => "network_error".to_string(),
            DeliveryError::Timeout => "timeout".to_string(),
            DeliveryError::Payload(_) => "payload_error".to_string(),
        }
    }

    /// Payload errors are deterministic and never retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DeliveryError::Payload(_))
    }
}
