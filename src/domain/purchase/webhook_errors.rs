//! Errors raised while authenticating and decoding gateway webhooks.

use thiserror::Error;

/// Errors that occur before a webhook is allowed to touch the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    /// Signature header was absent.
    #[error("Missing signature header: {0}")]
    MissingSignature(&'static str),

    /// Signature header could not be parsed.
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    /// HMAC did not match the payload.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signed timestamp is older than the tolerance window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Signed timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Payload authenticated but could not be decoded.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Required field missing from an authenticated payload.
    #[error("Missing field: {0}")]
    MissingField(&'static str),
}

impl WebhookError {
    /// True when the failure means the sender could not be authenticated.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            WebhookError::MissingSignature(_)
                | WebhookError::MalformedSignature(_)
                | WebhookError::InvalidSignature
                | WebhookError::TimestampOutOfRange
                | WebhookError::InvalidTimestamp
        )
    }
}
