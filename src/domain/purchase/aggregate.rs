//! Purchase aggregate entity.
//!
//! A Purchase is the durable record of one buyer's attempt to acquire one
//! course. It is created by order initiation, moved to `completed` or
//! `failed` by reconciliation, and to `refunded` by the refund flow. It is
//! never deleted.
//!
//! # Design Decisions
//!
//! - **Amount snapshot**: `amount` is copied from the course price at
//!   initiation and only corrected from an authenticated gateway settlement
//! - **Money in minor units**: all amounts are i64 paise/cents
//! - **Status through the state machine**: every transition is checked by
//!   [`PurchaseStatus`]; the repository then applies it with a
//!   compare-and-swap on the previous status

use crate::domain::foundation::{
    CourseId, Money, PurchaseId, StateMachine, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};

use super::{GatewayKind, PaymentConfirmation, PurchaseError, PurchaseStatus};

/// Gateway-confirmed refund details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRecord {
    /// Gateway refund reference.
    pub refund_ref: String,

    /// Amount returned to the buyer.
    pub amount: Money,

    /// Buyer-supplied reason.
    pub reason: String,

    /// When the gateway confirmed the refund.
    pub refunded_at: Timestamp,
}

/// Result of applying a confirmation to a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// First application; side effects must follow.
    Applied,
    /// Same payment was already applied; nothing to do.
    AlreadyApplied,
}

/// Purchase aggregate.
///
/// # Invariants
///
/// - `gateway_payment_ref` is set iff status is `completed` or `refunded`
/// - `refund` is present iff status is `refunded`
/// - buyer, course and id never change after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: PurchaseId,
    pub buyer_id: UserId,
    pub course_id: CourseId,

    /// Price snapshot taken at initiation.
    pub amount: Money,

    pub status: PurchaseStatus,

    /// Gateway the order was opened against.
    pub gateway: GatewayKind,

    /// Order/session reference assigned by the gateway. Unique.
    pub gateway_order_ref: Option<String>,

    /// Payment reference assigned once money moved.
    pub gateway_payment_ref: Option<String>,

    pub payment_method: Option<String>,

    /// Why the purchase failed, if it did.
    pub failure_reason: Option<String>,

    pub refund: Option<RefundRecord>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl Purchase {
    /// Opens a new pending purchase with the given price snapshot.
    pub fn initiate(
        buyer_id: UserId,
        course_id: CourseId,
        amount: Money,
        gateway: GatewayKind,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id: PurchaseId::new(),
            buyer_id,
            course_id,
            amount,
            status: PurchaseStatus::Pending,
            gateway,
            gateway_order_ref: None,
            gateway_payment_ref: None,
            payment_method: None,
            failure_reason: None,
            refund: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.buyer_id == user_id
    }

    /// Records the gateway order reference returned at initiation.
    pub fn attach_order(&mut self, order_ref: impl Into<String>) -> Result<(), PurchaseError> {
        if self.status != PurchaseStatus::Pending {
            return Err(PurchaseError::invalid_state(self.id, self.status, "attach an order to"));
        }
        if self.gateway_order_ref.is_some() {
            return Err(PurchaseError::anomaly(
                self.id,
                "gateway order reference already attached",
            ));
        }
        self.gateway_order_ref = Some(order_ref.into());
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Applies a verified payment confirmation.
    ///
    /// Re-applying the same payment reference is a no-op. A different
    /// payment reference on a completed purchase is an anomaly and leaves
    /// the purchase untouched.
    pub fn complete(
        &mut self,
        confirmation: &PaymentConfirmation,
    ) -> Result<CompletionOutcome, PurchaseError> {
        if self.gateway_order_ref.as_deref() != Some(confirmation.order_ref.as_str()) {
            return Err(PurchaseError::anomaly(
                self.id,
                format!(
                    "confirmation for order {} applied to purchase with order {:?}",
                    confirmation.order_ref, self.gateway_order_ref
                ),
            ));
        }

        match self.status {
            PurchaseStatus::Completed => {
                if self.gateway_payment_ref.as_deref() == Some(confirmation.payment_ref.as_str()) {
                    Ok(CompletionOutcome::AlreadyApplied)
                } else {
                    Err(PurchaseError::anomaly(
                        self.id,
                        format!(
                            "already completed with payment {:?}, got {}",
                            self.gateway_payment_ref, confirmation.payment_ref
                        ),
                    ))
                }
            }
            PurchaseStatus::Pending => {
                let settled = match confirmation.settled_amount {
                    Some(minor) => self.amount.with_minor(minor)?,
                    None => self.amount.clone(),
                };
                self.transition_to(PurchaseStatus::Completed, "complete")?;
                let now = Timestamp::now();
                self.gateway_payment_ref = Some(confirmation.payment_ref.clone());
                if confirmation.payment_method.is_some() {
                    self.payment_method = confirmation.payment_method.clone();
                }
                self.amount = settled;
                self.completed_at = Some(now);
                self.updated_at = now;
                Ok(CompletionOutcome::Applied)
            }
            current => Err(PurchaseError::invalid_state(self.id, current, "complete")),
        }
    }

    /// Marks a pending purchase as failed.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), PurchaseError> {
        self.transition_to(PurchaseStatus::Failed, "fail")?;
        self.failure_reason = Some(reason.into());
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Records a gateway-confirmed refund.
    pub fn record_refund(&mut self, refund: RefundRecord) -> Result<(), PurchaseError> {
        if self.status == PurchaseStatus::Refunded {
            return Err(PurchaseError::AlreadyRefunded(self.id));
        }
        self.transition_to(PurchaseStatus::Refunded, "refund")?;
        self.updated_at = refund.refunded_at;
        self.refund = Some(refund);
        Ok(())
    }

    fn transition_to(
        &mut self,
        target: PurchaseStatus,
        attempted: &'static str,
    ) -> Result<(), PurchaseError> {
        self.status = self
            .status
            .transition_to(target)
            .map_err(|_| PurchaseError::invalid_state(self.id, self.status, attempted))?;
        Ok(())
    }
}
