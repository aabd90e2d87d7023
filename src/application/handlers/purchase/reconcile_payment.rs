//! ReconcilePaymentHandler - applies verified gateway confirmations to the ledger.
//!
//! Both confirmation paths (webhook and client relay) end here once their
//! authenticity is proven. The handler:
//!
//! 1. Looks the purchase up by gateway order reference
//! 2. Applies the confirmation to the aggregate
//! 3. Persists with a compare-and-swap on `pending`
//! 4. Fans out to the enrollment views only if this call won the swap
//!
//! A lost swap reloads the purchase and re-applies, so a concurrent
//! duplicate resolves to `AlreadyApplied` instead of a second fan-out.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::foundation::ErrorCode;
use crate::domain::purchase::{
    CompletionOutcome, PaymentConfirmation, Purchase, PurchaseError, PurchaseStatus,
};
use crate::ports::{
    InconsistencyKind, InconsistencyReport, InconsistencyReporter, PurchaseRepository,
};

use super::fanout::{EnrollmentFanout, FanoutDirection, FanoutOutcome};

/// Upper bound on reload-and-retry after losing a compare-and-swap.
const MAX_SWAP_ATTEMPTS: u32 = 3;

/// Which path delivered the confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationSource {
    Webhook,
    ClientRelay,
}

impl ConfirmationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationSource::Webhook => "webhook",
            ConfirmationSource::ClientRelay => "client_relay",
        }
    }
}

/// Command to apply a verified payment confirmation.
#[derive(Debug, Clone)]
pub struct ReconcilePaymentCommand {
    pub confirmation: PaymentConfirmation,
    pub source: ConfirmationSource,
}

/// Result of reconciliation.
#[derive(Debug, Clone)]
pub struct ReconcilePaymentResult {
    pub purchase: Purchase,
    pub outcome: CompletionOutcome,
    /// Present only when this call performed the transition.
    pub fanout: Option<FanoutOutcome>,
}

/// Result of applying a gateway failure signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentFailureOutcome {
    /// Pending purchase moved to `failed`.
    MarkedFailed(Purchase),
    /// Purchase was no longer pending, or unknown; nothing changed.
    Ignored,
}

/// The reconciliation engine.
pub struct ReconcilePaymentHandler {
    repository: Arc<dyn PurchaseRepository>,
    fanout: EnrollmentFanout,
    reporter: Arc<dyn InconsistencyReporter>,
}

impl ReconcilePaymentHandler {
    pub fn new(
        repository: Arc<dyn PurchaseRepository>,
        fanout: EnrollmentFanout,
        reporter: Arc<dyn InconsistencyReporter>,
    ) -> Self {
        Self {
            repository,
            fanout,
            reporter,
        }
    }

    #[tracing::instrument(
        skip_all,
        fields(
            order_ref = %cmd.confirmation.order_ref,
            payment_ref = %cmd.confirmation.payment_ref,
            source = cmd.source.as_str()
        )
    )]
    pub async fn handle(
        &self,
        cmd: ReconcilePaymentCommand,
    ) -> Result<ReconcilePaymentResult, PurchaseError> {
        let confirmation = &cmd.confirmation;

        for attempt in 1..=MAX_SWAP_ATTEMPTS {
            let mut purchase = self
                .repository
                .find_by_order_ref(&confirmation.order_ref)
                .await?
                .ok_or_else(|| PurchaseError::purchase_not_found(&confirmation.order_ref))?;

            let outcome = match purchase.complete(confirmation) {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.report_rejection(&purchase, &err).await;
                    return Err(err);
                }
            };

            if outcome == CompletionOutcome::AlreadyApplied {
                debug!(purchase_id = %purchase.id, "Confirmation already applied");
                return Ok(ReconcilePaymentResult {
                    purchase,
                    outcome,
                    fanout: None,
                });
            }

            match self
                .repository
                .update_if_status(&purchase, PurchaseStatus::Pending)
                .await
            {
                Ok(true) => {
                    info!(
                        purchase_id = %purchase.id,
                        buyer_id = %purchase.buyer_id,
                        course_id = %purchase.course_id,
                        amount = purchase.amount.minor_units,
                        "Purchase completed"
                    );
                    let fanout = self.fanout.dispatch(FanoutDirection::Enroll, &purchase).await;
                    return Ok(ReconcilePaymentResult {
                        purchase,
                        outcome,
                        fanout: Some(fanout),
                    });
                }
                Ok(false) => {
                    debug!(
                        purchase_id = %purchase.id,
                        attempt,
                        "Lost status swap, reloading purchase"
                    );
                }
                Err(e) if e.code == ErrorCode::DuplicateCompletion => {
                    let err = PurchaseError::anomaly(
                        purchase.id,
                        "buyer already holds a completed purchase of this course",
                    );
                    self.report(&purchase, InconsistencyKind::DuplicateCompletion, &err)
                        .await;
                    return Err(err);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(PurchaseError::infrastructure(format!(
            "purchase for order {} kept changing during reconciliation",
            confirmation.order_ref
        )))
    }

    /// Applies a gateway failure or cancellation signal.
    #[tracing::instrument(skip_all, fields(order_ref = %order_ref))]
    pub async fn mark_failed(
        &self,
        order_ref: &str,
        reason: &str,
    ) -> Result<PaymentFailureOutcome, PurchaseError> {
        for _ in 0..MAX_SWAP_ATTEMPTS {
            let Some(mut purchase) = self.repository.find_by_order_ref(order_ref).await? else {
                warn!("Failure signal for unknown order");
                return Ok(PaymentFailureOutcome::Ignored);
            };

            if purchase.status != PurchaseStatus::Pending {
                debug!(
                    purchase_id = %purchase.id,
                    status = %purchase.status,
                    "Failure signal for settled purchase ignored"
                );
                return Ok(PaymentFailureOutcome::Ignored);
            }

            purchase.fail(reason)?;
            if self
                .repository
                .update_if_status(&purchase, PurchaseStatus::Pending)
                .await?
            {
                info!(purchase_id = %purchase.id, reason, "Purchase marked failed");
                return Ok(PaymentFailureOutcome::MarkedFailed(purchase));
            }
        }

        Err(PurchaseError::infrastructure(format!(
            "purchase for order {} kept changing while marking failed",
            order_ref
        )))
    }

    async fn report_rejection(&self, purchase: &Purchase, err: &PurchaseError) {
        let kind = match err {
            PurchaseError::ReconciliationAnomaly { .. } => InconsistencyKind::ConflictingConfirmation,
            PurchaseError::InvalidState { .. } => InconsistencyKind::CaptureOnClosedPurchase,
            _ => return,
        };
        self.report(purchase, kind, err).await;
    }

    async fn report(&self, purchase: &Purchase, kind: InconsistencyKind, err: &PurchaseError) {
        warn!(
            target: "operator",
            purchase_id = %purchase.id,
            kind = kind.as_str(),
            error = %err,
            "Reconciliation anomaly"
        );
        self.reporter
            .report(InconsistencyReport::new(
                kind,
                purchase.id,
                purchase.buyer_id.clone(),
                purchase.course_id,
                err.detail(),
            ))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::alerts::RecordingInconsistencyReporter;
    use crate::adapters::memory::{
        InMemoryBuyerDirectory, InMemoryCourseRoster, InMemoryPurchaseRepository,
    };
    use crate::application::handlers::purchase::RetryPolicy;
    use crate::domain::foundation::{CourseId, Currency, Money, UserId};
    use crate::domain::purchase::GatewayKind;
    use crate::ports::CourseRoster;
    use std::time::Duration;

    struct Fixture {
        repo: Arc<InMemoryPurchaseRepository>,
        buyers: Arc<InMemoryBuyerDirectory>,
        roster: Arc<InMemoryCourseRoster>,
        reporter: Arc<RecordingInconsistencyReporter>,
        handler: Arc<ReconcilePaymentHandler>,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryPurchaseRepository::new());
        let buyers = Arc::new(InMemoryBuyerDirectory::new());
        let roster = Arc::new(InMemoryCourseRoster::new());
        let reporter = Arc::new(RecordingInconsistencyReporter::new());
        let fanout = EnrollmentFanout::new(
            repo.clone(),
            buyers.clone(),
            roster.clone(),
            reporter.clone(),
            RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)),
        );
        let handler = Arc::new(ReconcilePaymentHandler::new(
            repo.clone(),
            fanout,
            reporter.clone(),
        ));
        Fixture {
            repo,
            buyers,
            roster,
            reporter,
            handler,
        }
    }

    async fn seed_pending(repo: &InMemoryPurchaseRepository, order_ref: &str) -> Purchase {
        let mut purchase = Purchase::initiate(
            UserId::new("buyer-1").unwrap(),
            CourseId::new(),
            Money::from_minor(99_900, Currency::inr()).unwrap(),
            GatewayKind::Mock,
        );
        purchase.attach_order(order_ref).unwrap();
        repo.insert(&purchase).await.unwrap();
        purchase
    }

    fn cmd(order_ref: &str, payment_ref: &str) -> ReconcilePaymentCommand {
        ReconcilePaymentCommand {
            confirmation: PaymentConfirmation::new(order_ref, payment_ref).with_method("upi"),
            source: ConfirmationSource::Webhook,
        }
    }

    #[tokio::test]
    async fn first_confirmation_completes_and_enrolls() {
        let f = fixture();
        let seeded = seed_pending(&f.repo, "order_1").await;

        let result = f.handler.handle(cmd("order_1", "pay_1")).await.unwrap();

        assert_eq!(result.outcome, CompletionOutcome::Applied);
        assert_eq!(result.fanout, Some(FanoutOutcome::Applied));
        assert_eq!(result.purchase.status, PurchaseStatus::Completed);
        assert_eq!(result.purchase.payment_method.as_deref(), Some("upi"));
        assert!(f.buyers.is_enrolled(&seeded.buyer_id, &seeded.course_id).await);
        assert!(f
            .roster
            .has_student(&seeded.course_id, &seeded.buyer_id)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn redelivery_is_a_no_op() {
        let f = fixture();
        seed_pending(&f.repo, "order_1").await;
        f.handler.handle(cmd("order_1", "pay_1")).await.unwrap();

        let again = f.handler.handle(cmd("order_1", "pay_1")).await.unwrap();

        assert_eq!(again.outcome, CompletionOutcome::AlreadyApplied);
        assert!(again.fanout.is_none());
        assert_eq!(again.purchase.gateway_payment_ref.as_deref(), Some("pay_1"));
    }

    #[tokio::test]
    async fn concurrent_confirmations_fan_out_once() {
        let f = fixture();
        let seeded = seed_pending(&f.repo, "order_1").await;

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let handler = f.handler.clone();
                tokio::spawn(async move { handler.handle(cmd("order_1", "pay_1")).await })
            })
            .collect();

        let mut applied = 0;
        for task in tasks {
            let result = task.await.unwrap().unwrap();
            if result.outcome == CompletionOutcome::Applied {
                applied += 1;
            }
        }

        assert_eq!(applied, 1);
        assert_eq!(f.roster.students(&seeded.course_id).await.len(), 1);
    }

    #[tokio::test]
    async fn different_payment_ref_is_reported_anomaly() {
        let f = fixture();
        seed_pending(&f.repo, "order_1").await;
        f.handler.handle(cmd("order_1", "pay_1")).await.unwrap();

        let err = f.handler.handle(cmd("order_1", "pay_2")).await.unwrap_err();

        assert!(matches!(err, PurchaseError::ReconciliationAnomaly { .. }));
        let stored = f.repo.find_by_order_ref("order_1").await.unwrap().unwrap();
        assert_eq!(stored.gateway_payment_ref.as_deref(), Some("pay_1"));
        let reports = f.reporter.reports().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].kind, InconsistencyKind::ConflictingConfirmation);
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let f = fixture();

        let err = f.handler.handle(cmd("order_missing", "pay_1")).await.unwrap_err();

        assert!(matches!(err, PurchaseError::PurchaseNotFound(_)));
    }

    #[tokio::test]
    async fn capture_on_failed_purchase_is_rejected_and_reported() {
        let f = fixture();
        seed_pending(&f.repo, "order_1").await;
        f.handler.mark_failed("order_1", "expired").await.unwrap();

        let err = f.handler.handle(cmd("order_1", "pay_1")).await.unwrap_err();

        assert!(matches!(err, PurchaseError::InvalidState { .. }));
        assert_eq!(
            f.reporter.reports().await[0].kind,
            InconsistencyKind::CaptureOnClosedPurchase
        );
    }

    #[tokio::test]
    async fn second_completion_for_same_pair_is_blocked() {
        let f = fixture();
        let first = seed_pending(&f.repo, "order_1").await;
        let mut second = Purchase::initiate(
            first.buyer_id.clone(),
            first.course_id,
            first.amount.clone(),
            GatewayKind::Mock,
        );
        second.attach_order("order_2").unwrap();
        f.repo.insert(&second).await.unwrap();

        f.handler.handle(cmd("order_1", "pay_1")).await.unwrap();
        let err = f.handler.handle(cmd("order_2", "pay_2")).await.unwrap_err();

        assert!(matches!(err, PurchaseError::ReconciliationAnomaly { .. }));
        let stored = f.repo.find_by_order_ref("order_2").await.unwrap().unwrap();
        assert_eq!(stored.status, PurchaseStatus::Pending);
        assert_eq!(
            f.reporter.reports().await[0].kind,
            InconsistencyKind::DuplicateCompletion
        );
    }

    #[tokio::test]
    async fn settled_amount_overrides_snapshot() {
        let f = fixture();
        seed_pending(&f.repo, "order_1").await;

        let command = ReconcilePaymentCommand {
            confirmation: PaymentConfirmation::new("order_1", "pay_1").with_settled_amount(89_900),
            source: ConfirmationSource::ClientRelay,
        };
        let result = f.handler.handle(command).await.unwrap();

        assert_eq!(result.purchase.amount.minor_units, 89_900);
    }

    #[tokio::test]
    async fn mark_failed_moves_pending_to_failed() {
        let f = fixture();
        seed_pending(&f.repo, "order_1").await;

        let outcome = f.handler.mark_failed("order_1", "card declined").await.unwrap();

        match outcome {
            PaymentFailureOutcome::MarkedFailed(purchase) => {
                assert_eq!(purchase.status, PurchaseStatus::Failed);
                assert_eq!(purchase.failure_reason.as_deref(), Some("card declined"));
            }
            other => panic!("expected MarkedFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn failure_after_completion_is_ignored() {
        let f = fixture();
        seed_pending(&f.repo, "order_1").await;
        f.handler.handle(cmd("order_1", "pay_1")).await.unwrap();

        let outcome = f.handler.mark_failed("order_1", "late failure").await.unwrap();

        assert_eq!(outcome, PaymentFailureOutcome::Ignored);
        let stored = f.repo.find_by_order_ref("order_1").await.unwrap().unwrap();
        assert_eq!(stored.status, PurchaseStatus::Completed);
    }
}
