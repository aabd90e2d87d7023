//! Refund eligibility rules.

use crate::domain::foundation::{Money, Timestamp, ValidationError};

use super::{Purchase, PurchaseError, PurchaseStatus};

const MIN_REASON_CHARS: usize = 2;
const MAX_REASON_CHARS: usize = 100;

/// Decides whether a completed purchase may be refunded and for how much.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundPolicy {
    window_days: i64,
}

impl RefundPolicy {
    pub fn new(window_days: u32) -> Self {
        Self {
            window_days: i64::from(window_days),
        }
    }

    pub fn window_days(&self) -> i64 {
        self.window_days
    }

    /// Returns the refundable amount, or why the purchase is ineligible.
    ///
    /// The full purchase amount is refunded.
    pub fn evaluate(&self, purchase: &Purchase, now: Timestamp) -> Result<Money, PurchaseError> {
        match purchase.status {
            PurchaseStatus::Completed => {}
            PurchaseStatus::Refunded => return Err(PurchaseError::AlreadyRefunded(purchase.id)),
            other => return Err(PurchaseError::invalid_state(purchase.id, other, "refund")),
        }

        let completed_at = purchase.completed_at.unwrap_or(purchase.updated_at);
        let deadline = completed_at.add_days(self.window_days);
        if deadline.is_before(&now) {
            return Err(PurchaseError::refund_not_allowed(
                purchase.id,
                format!("refund window of {} days has passed", self.window_days),
            ));
        }

        Ok(purchase.amount.clone())
    }

    /// Normalizes a buyer-supplied refund reason.
    pub fn validate_reason(reason: &str) -> Result<String, ValidationError> {
        let trimmed = reason.trim();
        let len = trimmed.chars().count();
        if len == 0 {
            return Err(ValidationError::empty_field("refund_reason"));
        }
        if !(MIN_REASON_CHARS..=MAX_REASON_CHARS).contains(&len) {
            return Err(ValidationError::out_of_range(
                "refund_reason",
                MIN_REASON_CHARS as i64,
                MAX_REASON_CHARS as i64,
                len as i64,
            ));
        }
        Ok(trimmed.to_string())
    }
}

impl Default for RefundPolicy {
    fn default() -> Self {
        Self::new(7)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{CourseId, Currency, UserId};
    use crate::domain::purchase::{GatewayKind, PaymentConfirmation};

    fn completed_purchase() -> Purchase {
        let mut purchase = Purchase::initiate(
            UserId::new("user-1").unwrap(),
            CourseId::new(),
            Money::from_minor(99_900, Currency::inr()).unwrap(),
            GatewayKind::Razorpay,
        );
        purchase.attach_order("order_1").unwrap();
        purchase
            .complete(&PaymentConfirmation::new("order_1", "pay_1"))
            .unwrap();
        purchase
    }

    #[test]
    fn full_amount_is_refundable_inside_window() {
        let purchase = completed_purchase();
        let amount = RefundPolicy::default()
            .evaluate(&purchase, Timestamp::now())
            .unwrap();
        assert_eq!(amount.minor_units, 99_900);
    }

    #[test]
    fn refund_after_window_is_not_allowed() {
        let purchase = completed_purchase();
        let later = Timestamp::now().add_days(8);
        assert!(matches!(
            RefundPolicy::new(7).evaluate(&purchase, later),
            Err(PurchaseError::RefundNotAllowed { .. })
        ));
    }

    #[test]
    fn zero_day_window_allows_same_instant_only() {
        let purchase = completed_purchase();
        let completed_at = purchase.completed_at.unwrap();
        assert!(RefundPolicy::new(0).evaluate(&purchase, completed_at).is_ok());
        assert!(RefundPolicy::new(0)
            .evaluate(&purchase, completed_at.add_days(1))
            .is_err());
    }

    #[test]
    fn pending_purchase_cannot_be_refunded() {
        let mut purchase = completed_purchase();
        purchase.status = PurchaseStatus::Pending;
        assert!(matches!(
            RefundPolicy::default().evaluate(&purchase, Timestamp::now()),
            Err(PurchaseError::InvalidState { .. })
        ));
    }

    #[test]
    fn refunded_purchase_reports_already_refunded() {
        let mut purchase = completed_purchase();
        purchase.status = PurchaseStatus::Refunded;
        assert_eq!(
            RefundPolicy::default().evaluate(&purchase, Timestamp::now()),
            Err(PurchaseError::AlreadyRefunded(purchase.id))
        );
    }

    #[test]
    fn reason_is_trimmed_and_length_checked() {
        assert_eq!(
            RefundPolicy::validate_reason("  not useful  ").unwrap(),
            "not useful"
        );
        assert!(RefundPolicy::validate_reason("x").is_err());
        assert!(RefundPolicy::validate_reason("   ").is_err());
        assert!(RefundPolicy::validate_reason(&"a".repeat(101)).is_err());
        assert!(RefundPolicy::validate_reason(&"a".repeat(100)).is_ok());
    }
}
