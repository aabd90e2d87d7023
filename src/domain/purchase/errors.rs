//! Purchase-specific error types.
//!
//! Every operation on the purchase ledger resolves to one of these. Each
//! variant belongs to exactly one [`ErrorCategory`], which drives HTTP
//! mapping and logging.
//!
//! # HTTP Status Mapping
//!
//! | Category | HTTP Status |
//! |----------|-------------|
//! | NotFound | 404 |
//! | Conflict | 409 |
//! | Unauthorized | 401 |
//! | Forbidden | 403 |
//! | VerificationFailed | 400 |
//! | Validation | 400 |
//! | Gateway | 502 |
//! | InternalInconsistency | 500 |
//! | Infrastructure | 500 |

use crate::domain::foundation::{
    CourseId, DomainError, ErrorCode, PurchaseId, UserId, ValidationError,
};

use super::{PurchaseStatus, WebhookError};

/// Coarse error classes shared by every surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    Conflict,
    Unauthorized,
    Forbidden,
    VerificationFailed,
    Validation,
    Gateway,
    InternalInconsistency,
    Infrastructure,
}

/// Which confirmation path failed authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationKind {
    /// Server-to-server webhook signature.
    Webhook,
    /// Client-relayed order/payment signature.
    ClientRelay,
}

/// Purchase-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseError {
    CourseNotFound(CourseId),

    BuyerNotFound(UserId),

    /// No purchase matches the lookup key (id or gateway order ref).
    PurchaseNotFound(String),

    /// Buyer already holds a completed purchase of this course.
    AlreadyPurchased { buyer_id: UserId, course_id: CourseId },

    AlreadyRefunded(PurchaseId),

    /// The requested transition is illegal from the current status.
    InvalidState {
        purchase_id: PurchaseId,
        current: PurchaseStatus,
        attempted: &'static str,
    },

    /// A confirmation contradicts what the ledger already recorded.
    ReconciliationAnomaly {
        purchase_id: PurchaseId,
        detail: String,
    },

    /// Caller does not own the purchase.
    NotAuthorized(PurchaseId),

    /// Refund policy rejects the request.
    RefundNotAllowed {
        purchase_id: PurchaseId,
        reason: String,
    },

    VerificationFailed(VerificationKind),

    /// Gateway echoed a different amount than was requested.
    AmountMismatch { expected: i64, actual: i64 },

    /// Upstream payment provider failure.
    Gateway { message: String, retryable: bool },

    GatewayTimeout,

    /// Fan-out could not be reconciled after retries.
    InternalInconsistency {
        purchase_id: PurchaseId,
        detail: String,
    },

    ValidationFailed { field: String, message: String },

    Infrastructure(String),
}

impl PurchaseError {
    pub fn purchase_not_found(key: impl ToString) -> Self {
        PurchaseError::PurchaseNotFound(key.to_string())
    }

    pub fn invalid_state(
        purchase_id: PurchaseId,
        current: PurchaseStatus,
        attempted: &'static str,
    ) -> Self {
        PurchaseError::InvalidState {
            purchase_id,
            current,
            attempted,
        }
    }

    pub fn anomaly(purchase_id: PurchaseId, detail: impl Into<String>) -> Self {
        PurchaseError::ReconciliationAnomaly {
            purchase_id,
            detail: detail.into(),
        }
    }

    pub fn refund_not_allowed(purchase_id: PurchaseId, reason: impl Into<String>) -> Self {
        PurchaseError::RefundNotAllowed {
            purchase_id,
            reason: reason.into(),
        }
    }

    pub fn gateway(message: impl Into<String>, retryable: bool) -> Self {
        PurchaseError::Gateway {
            message: message.into(),
            retryable,
        }
    }

    pub fn inconsistency(purchase_id: PurchaseId, detail: impl Into<String>) -> Self {
        PurchaseError::InternalInconsistency {
            purchase_id,
            detail: detail.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        PurchaseError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        PurchaseError::Infrastructure(message.into())
    }

    /// Returns the category this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            PurchaseError::CourseNotFound(_)
            | PurchaseError::BuyerNotFound(_)
            | PurchaseError::PurchaseNotFound(_) => ErrorCategory::NotFound,
            PurchaseError::AlreadyPurchased { .. }
            | PurchaseError::AlreadyRefunded(_)
            | PurchaseError::InvalidState { .. }
            | PurchaseError::ReconciliationAnomaly { .. }
            | PurchaseError::RefundNotAllowed { .. } => ErrorCategory::Conflict,
            PurchaseError::NotAuthorized(_) => ErrorCategory::Forbidden,
            PurchaseError::VerificationFailed(_) => ErrorCategory::VerificationFailed,
            PurchaseError::AmountMismatch { .. }
            | PurchaseError::Gateway { .. }
            | PurchaseError::GatewayTimeout => ErrorCategory::Gateway,
            PurchaseError::InternalInconsistency { .. } => ErrorCategory::InternalInconsistency,
            PurchaseError::ValidationFailed { .. } => ErrorCategory::Validation,
            PurchaseError::Infrastructure(_) => ErrorCategory::Infrastructure,
        }
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            PurchaseError::CourseNotFound(_) => ErrorCode::CourseNotFound,
            PurchaseError::BuyerNotFound(_) => ErrorCode::BuyerNotFound,
            PurchaseError::PurchaseNotFound(_) => ErrorCode::PurchaseNotFound,
            PurchaseError::AlreadyPurchased { .. } => ErrorCode::AlreadyPurchased,
            PurchaseError::AlreadyRefunded(_) => ErrorCode::AlreadyRefunded,
            PurchaseError::InvalidState { .. } => ErrorCode::InvalidStateTransition,
            PurchaseError::ReconciliationAnomaly { .. } => ErrorCode::DuplicateCompletion,
            PurchaseError::NotAuthorized(_) => ErrorCode::Forbidden,
            PurchaseError::RefundNotAllowed { .. } => ErrorCode::RefundNotAllowed,
            PurchaseError::VerificationFailed(_) => ErrorCode::VerificationFailed,
            PurchaseError::AmountMismatch { .. } => ErrorCode::AmountMismatch,
            PurchaseError::Gateway { .. } | PurchaseError::GatewayTimeout => {
                ErrorCode::PaymentGatewayError
            }
            PurchaseError::InternalInconsistency { .. } => ErrorCode::InternalError,
            PurchaseError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            PurchaseError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Client-safe message. Gateway and internal detail stay server-side.
    pub fn message(&self) -> String {
        match self {
            PurchaseError::CourseNotFound(id) => format!("Course not found: {}", id),
            PurchaseError::BuyerNotFound(id) => format!("User not found: {}", id),
            PurchaseError::PurchaseNotFound(_) => "Purchase not found".to_string(),
            PurchaseError::AlreadyPurchased { .. } => {
                "You have already purchased this course".to_string()
            }
            PurchaseError::AlreadyRefunded(_) => "Purchase has already been refunded".to_string(),
            PurchaseError::InvalidState {
                current, attempted, ..
            } => format!("Cannot {} a purchase in {} state", attempted, current),
            PurchaseError::ReconciliationAnomaly { .. } => {
                "Payment confirmation conflicts with the recorded purchase".to_string()
            }
            PurchaseError::NotAuthorized(_) => "You do not own this purchase".to_string(),
            PurchaseError::RefundNotAllowed { reason, .. } => {
                format!("Refund not allowed: {}", reason)
            }
            PurchaseError::VerificationFailed(VerificationKind::Webhook) => {
                "Invalid webhook signature".to_string()
            }
            PurchaseError::VerificationFailed(VerificationKind::ClientRelay) => {
                "Payment verification failed".to_string()
            }
            PurchaseError::AmountMismatch { .. } => {
                "Mismatch in order amount. Please try again".to_string()
            }
            PurchaseError::Gateway { .. } | PurchaseError::GatewayTimeout => {
                "Payment provider is unavailable. Please try again".to_string()
            }
            PurchaseError::ValidationFailed { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
            PurchaseError::InternalInconsistency { .. } | PurchaseError::Infrastructure(_) => {
                "Internal server error".to_string()
            }
        }
    }

    /// Full detail for server-side logs.
    pub fn detail(&self) -> String {
        match self {
            PurchaseError::PurchaseNotFound(key) => format!("Purchase not found: {}", key),
            PurchaseError::ReconciliationAnomaly {
                purchase_id,
                detail,
            } => format!("Reconciliation anomaly on {}: {}", purchase_id, detail),
            PurchaseError::AmountMismatch { expected, actual } => format!(
                "Gateway echoed amount {} but {} was requested",
                actual, expected
            ),
            PurchaseError::Gateway { message, .. } => format!("Gateway error: {}", message),
            PurchaseError::GatewayTimeout => "Gateway call timed out".to_string(),
            PurchaseError::InternalInconsistency {
                purchase_id,
                detail,
            } => format!("Internal inconsistency on {}: {}", purchase_id, detail),
            PurchaseError::Infrastructure(msg) => format!("Infrastructure error: {}", msg),
            other => other.message(),
        }
    }

    /// Returns true if retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            PurchaseError::Gateway { retryable, .. } => *retryable,
            PurchaseError::GatewayTimeout | PurchaseError::Infrastructure(_) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for PurchaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.detail())
    }
}

impl std::error::Error for PurchaseError {}

impl From<DomainError> for PurchaseError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed => PurchaseError::ValidationFailed {
                field: err
                    .details
                    .get("field")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                message: err.message,
            },
            ErrorCode::PurchaseNotFound => PurchaseError::PurchaseNotFound(err.message),
            _ => PurchaseError::Infrastructure(err.to_string()),
        }
    }
}

impl From<ValidationError> for PurchaseError {
    fn from(err: ValidationError) -> Self {
        let field = match &err {
            ValidationError::EmptyField { field }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::InvalidFormat { field, .. } => field.clone(),
        };
        PurchaseError::ValidationFailed {
            field,
            message: err.to_string(),
        }
    }
}

impl From<WebhookError> for PurchaseError {
    fn from(err: WebhookError) -> Self {
        if err.is_authentication_failure() {
            PurchaseError::VerificationFailed(VerificationKind::Webhook)
        } else {
            PurchaseError::validation("payload", err.to_string())
        }
    }
}

impl From<PurchaseError> for DomainError {
    fn from(err: PurchaseError) -> Self {
        DomainError::new(err.code(), err.detail())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================
    // Category Mapping
    // ============================================================

    #[test]
    fn not_found_variants_share_category() {
        assert_eq!(
            PurchaseError::CourseNotFound(CourseId::new()).category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            PurchaseError::purchase_not_found("order_1").category(),
            ErrorCategory::NotFound
        );
    }

    #[test]
    fn conflicts_cover_duplicates_and_illegal_transitions() {
        let id = PurchaseId::new();
        assert_eq!(
            PurchaseError::AlreadyRefunded(id).category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            PurchaseError::invalid_state(id, PurchaseStatus::Refunded, "complete").category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            PurchaseError::anomaly(id, "different payment ref").category(),
            ErrorCategory::Conflict
        );
    }

    #[test]
    fn amount_mismatch_is_a_gateway_error() {
        let err = PurchaseError::AmountMismatch {
            expected: 199_900,
            actual: 100,
        };
        assert_eq!(err.category(), ErrorCategory::Gateway);
        assert_eq!(err.code(), ErrorCode::AmountMismatch);
    }

    // ============================================================
    // Messages
    // ============================================================

    #[test]
    fn gateway_message_does_not_leak_detail() {
        let err = PurchaseError::gateway("401 from api.stripe.com: bad key sk_live_abc", false);
        assert!(!err.message().contains("sk_live"));
        assert!(err.detail().contains("sk_live"));
    }

    #[test]
    fn internal_message_is_generic() {
        let err = PurchaseError::inconsistency(PurchaseId::new(), "roster write failed 3 times");
        assert_eq!(err.message(), "Internal server error");
    }

    #[test]
    fn verification_messages_name_the_path() {
        assert_eq!(
            PurchaseError::VerificationFailed(VerificationKind::Webhook).message(),
            "Invalid webhook signature"
        );
        assert_eq!(
            PurchaseError::VerificationFailed(VerificationKind::ClientRelay).message(),
            "Payment verification failed"
        );
    }

    // ============================================================
    // Conversions
    // ============================================================

    #[test]
    fn webhook_signature_error_becomes_verification_failure() {
        let err: PurchaseError = WebhookError::InvalidSignature.into();
        assert_eq!(err, PurchaseError::VerificationFailed(VerificationKind::Webhook));
    }

    #[test]
    fn webhook_payload_error_becomes_validation_failure() {
        let err: PurchaseError = WebhookError::MissingField("order_id").into();
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn domain_validation_error_keeps_field() {
        let err: PurchaseError = DomainError::validation("currency", "bad").into();
        match err {
            PurchaseError::ValidationFailed { field, .. } => assert_eq!(field, "currency"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn database_error_becomes_infrastructure() {
        let err: PurchaseError = DomainError::database("connection reset").into();
        assert!(matches!(err, PurchaseError::Infrastructure(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn conflicts_are_not_retryable() {
        assert!(!PurchaseError::AlreadyRefunded(PurchaseId::new()).is_retryable());
    }
}
