//! RefundPurchaseHandler - reverses a completed purchase.
//!
//! Once the gateway has accepted a refund the money is gone, so the ledger
//! write that follows is retried. If it still cannot land, operators are
//! told which refund reference is missing from the ledger.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::domain::foundation::{PurchaseId, Timestamp, UserId};
use crate::domain::purchase::{
    Purchase, PurchaseError, PurchaseStatus, RefundPolicy, RefundRecord,
};
use crate::ports::{
    InconsistencyKind, InconsistencyReport, InconsistencyReporter, PaymentGateway,
    PurchaseRepository, RefundRequest,
};

use super::fanout::{EnrollmentFanout, FanoutDirection, FanoutOutcome};
use super::retry::{retry_with_backoff, with_timeout, RetryPolicy};

/// Command to refund a purchase.
#[derive(Debug, Clone)]
pub struct RefundPurchaseCommand {
    pub buyer_id: UserId,
    pub purchase_id: PurchaseId,
    pub reason: String,
}

/// Result of a successful refund.
#[derive(Debug, Clone)]
pub struct RefundPurchaseResult {
    pub purchase: Purchase,
    pub refund: RefundRecord,
    pub fanout: FanoutOutcome,
}

/// Handler for refunds.
///
/// Enrollment is only retracted after the gateway accepted the refund. If
/// the gateway call fails the purchase stays `completed`.
pub struct RefundPurchaseHandler {
    repository: Arc<dyn PurchaseRepository>,
    gateway: Arc<dyn PaymentGateway>,
    fanout: EnrollmentFanout,
    reporter: Arc<dyn InconsistencyReporter>,
    policy: RefundPolicy,
    ledger_retry: RetryPolicy,
    gateway_timeout: Duration,
}

impl RefundPurchaseHandler {
    pub fn new(
        repository: Arc<dyn PurchaseRepository>,
        gateway: Arc<dyn PaymentGateway>,
        fanout: EnrollmentFanout,
        reporter: Arc<dyn InconsistencyReporter>,
        policy: RefundPolicy,
        ledger_retry: RetryPolicy,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            gateway,
            fanout,
            reporter,
            policy,
            ledger_retry,
            gateway_timeout,
        }
    }

    #[tracing::instrument(skip_all, fields(buyer_id = %cmd.buyer_id, purchase_id = %cmd.purchase_id))]
    pub async fn handle(
        &self,
        cmd: RefundPurchaseCommand,
    ) -> Result<RefundPurchaseResult, PurchaseError> {
        let reason = RefundPolicy::validate_reason(&cmd.reason)?;

        let purchase = self
            .repository
            .find_by_id(&cmd.purchase_id)
            .await?
            .ok_or_else(|| PurchaseError::purchase_not_found(cmd.purchase_id))?;

        if !purchase.is_owned_by(&cmd.buyer_id) {
            return Err(PurchaseError::NotAuthorized(purchase.id));
        }

        let amount = self.policy.evaluate(&purchase, Timestamp::now())?;

        let payment_ref = purchase.gateway_payment_ref.clone().ok_or_else(|| {
            PurchaseError::inconsistency(purchase.id, "completed purchase has no payment reference")
        })?;

        let receipt = with_timeout(
            self.gateway_timeout,
            self.gateway.refund(RefundRequest {
                purchase_id: purchase.id,
                payment_ref,
                amount: amount.clone(),
                reason: reason.clone(),
            }),
        )
        .await
        .map_err(|e| {
            error!(purchase_id = %purchase.id, error = %e, "Gateway refund failed");
            PurchaseError::from(e)
        })?;

        if !receipt.status.is_accepted() {
            error!(
                purchase_id = %purchase.id,
                refund_ref = %receipt.refund_ref,
                "Gateway rejected refund"
            );
            return Err(PurchaseError::gateway(
                format!("refund {} rejected by gateway", receipt.refund_ref),
                false,
            ));
        }

        let refund = RefundRecord {
            refund_ref: receipt.refund_ref,
            amount,
            reason,
            refunded_at: Timestamp::now(),
        };
        let purchase = match retry_with_backoff(
            &self.ledger_retry,
            "ledger.record_refund",
            PurchaseError::is_retryable,
            || self.try_record_refund(purchase.id, &refund),
        )
        .await
        {
            Ok(refunded) => refunded,
            Err(e) if e.is_retryable() => {
                return Err(self.report_unrecorded(&purchase, &refund, &e).await);
            }
            Err(e) => return Err(e),
        };

        info!(
            purchase_id = %purchase.id,
            refund_ref = %refund.refund_ref,
            amount = refund.amount.minor_units,
            "Purchase refunded"
        );

        let fanout = self.fanout.dispatch(FanoutDirection::Retract, &purchase).await;

        Ok(RefundPurchaseResult {
            purchase,
            refund,
            fanout,
        })
    }

    /// Applies the refund to a fresh copy of the purchase and swaps it in.
    async fn try_record_refund(
        &self,
        purchase_id: PurchaseId,
        refund: &RefundRecord,
    ) -> Result<Purchase, PurchaseError> {
        let mut current = self
            .repository
            .find_by_id(&purchase_id)
            .await?
            .ok_or_else(|| PurchaseError::purchase_not_found(purchase_id))?;

        match current.status {
            PurchaseStatus::Completed => {}
            // Only a concurrent refund moves a completed purchase.
            PurchaseStatus::Refunded => return Err(PurchaseError::AlreadyRefunded(purchase_id)),
            other => return Err(PurchaseError::invalid_state(purchase_id, other, "refund")),
        }

        current.record_refund(refund.clone())?;
        if self
            .repository
            .update_if_status(&current, PurchaseStatus::Completed)
            .await?
        {
            Ok(current)
        } else {
            // Lost the swap; the next attempt sees whoever won.
            Err(PurchaseError::Infrastructure(format!(
                "purchase {} changed while recording refund",
                purchase_id
            )))
        }
    }

    async fn report_unrecorded(
        &self,
        purchase: &Purchase,
        refund: &RefundRecord,
        cause: &PurchaseError,
    ) -> PurchaseError {
        error!(
            target: "operator",
            purchase_id = %purchase.id,
            buyer_id = %purchase.buyer_id,
            refund_ref = %refund.refund_ref,
            amount = refund.amount.minor_units,
            error = %cause,
            "Gateway refunded payment but the ledger write failed"
        );
        self.reporter
            .report(InconsistencyReport::new(
                InconsistencyKind::RefundNotRecorded,
                purchase.id,
                purchase.buyer_id.clone(),
                purchase.course_id,
                format!("refund {} accepted by gateway: {}", refund.refund_ref, cause),
            ))
            .await;
        PurchaseError::inconsistency(
            purchase.id,
            format!("refund {} accepted by gateway but not recorded", refund.refund_ref),
        )
    }
}
