//! Operator alerting port.
//!
//! Reconciliation never fails a request because a view write failed; it
//! reports here instead so an operator (or the sweep) can repair it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{CourseId, PurchaseId, Timestamp, UserId};

/// What kind of inconsistency was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyKind {
    /// Enrollment views could not be updated after all retries.
    FanoutExhausted,

    /// A confirmation carried a payment ref that contradicts the ledger.
    ConflictingConfirmation,

    /// Money moved for a purchase that was already failed or refunded.
    CaptureOnClosedPurchase,

    /// A second completion for the same buyer and course was rejected.
    DuplicateCompletion,

    /// The gateway refunded a payment the ledger still shows as completed.
    RefundNotRecorded,
}

impl InconsistencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InconsistencyKind::FanoutExhausted => "fanout_exhausted",
            InconsistencyKind::ConflictingConfirmation => "conflicting_confirmation",
            InconsistencyKind::CaptureOnClosedPurchase => "capture_on_closed_purchase",
            InconsistencyKind::DuplicateCompletion => "duplicate_completion",
            InconsistencyKind::RefundNotRecorded => "refund_not_recorded",
        }
    }
}

/// One operator-facing report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InconsistencyReport {
    pub kind: InconsistencyKind,
    pub purchase_id: PurchaseId,
    pub buyer_id: UserId,
    pub course_id: CourseId,
    pub detail: String,
    pub detected_at: Timestamp,
}

impl InconsistencyReport {
    pub fn new(
        kind: InconsistencyKind,
        purchase_id: PurchaseId,
        buyer_id: UserId,
        course_id: CourseId,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            purchase_id,
            buyer_id,
            course_id,
            detail: detail.into(),
            detected_at: Timestamp::now(),
        }
    }
}

/// Sink for inconsistencies that need operator attention.
///
/// Reporting is best effort and must not fail the caller.
#[async_trait]
pub trait InconsistencyReporter: Send + Sync {
    async fn report(&self, report: InconsistencyReport);
}
