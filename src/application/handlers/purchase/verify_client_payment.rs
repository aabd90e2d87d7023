//! VerifyClientPaymentHandler - client-relayed payment confirmation.
//!
//! After an in-browser checkout the client posts the gateway's order id,
//! payment id and signature. The signature is checked before anything is
//! read from the ledger; payment method and settled amount are then taken
//! from the gateway itself, never from the client.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::domain::foundation::UserId;
use crate::domain::purchase::{PaymentConfirmation, PurchaseError, VerificationKind};
use crate::ports::{GatewayError, PaymentDetails, PaymentGateway, PurchaseRepository};

use super::reconcile_payment::{
    ConfirmationSource, ReconcilePaymentCommand, ReconcilePaymentHandler, ReconcilePaymentResult,
};
use super::retry::{retry_with_backoff, with_timeout, RetryPolicy};

/// Command to verify a client-relayed payment.
#[derive(Debug, Clone)]
pub struct VerifyClientPaymentCommand {
    pub buyer_id: UserId,
    pub order_ref: String,
    pub payment_ref: String,
    pub signature: String,
}

/// Handler for client-relayed confirmations.
pub struct VerifyClientPaymentHandler {
    repository: Arc<dyn PurchaseRepository>,
    gateway: Arc<dyn PaymentGateway>,
    reconciler: Arc<ReconcilePaymentHandler>,
    gateway_timeout: Duration,
    fetch_policy: RetryPolicy,
}

impl VerifyClientPaymentHandler {
    pub fn new(
        repository: Arc<dyn PurchaseRepository>,
        gateway: Arc<dyn PaymentGateway>,
        reconciler: Arc<ReconcilePaymentHandler>,
        gateway_timeout: Duration,
        fetch_policy: RetryPolicy,
    ) -> Self {
        Self {
            repository,
            gateway,
            reconciler,
            gateway_timeout,
            fetch_policy,
        }
    }

    #[tracing::instrument(
        skip_all,
        fields(buyer_id = %cmd.buyer_id, order_ref = %cmd.order_ref, payment_ref = %cmd.payment_ref)
    )]
    pub async fn handle(
        &self,
        cmd: VerifyClientPaymentCommand,
    ) -> Result<ReconcilePaymentResult, PurchaseError> {
        for (field, value) in [
            ("orderId", &cmd.order_ref),
            ("paymentId", &cmd.payment_ref),
            ("signature", &cmd.signature),
        ] {
            if value.trim().is_empty() {
                return Err(PurchaseError::validation(field, "must not be empty"));
            }
        }

        let valid = self
            .gateway
            .verify_client_signature(&cmd.order_ref, &cmd.payment_ref, &cmd.signature)
            .await?;
        if !valid {
            warn!(target: "security", "Client payment signature mismatch");
            return Err(PurchaseError::VerificationFailed(VerificationKind::ClientRelay));
        }

        let purchase = self
            .repository
            .find_by_order_ref(&cmd.order_ref)
            .await?
            .ok_or_else(|| PurchaseError::purchase_not_found(&cmd.order_ref))?;

        if !purchase.is_owned_by(&cmd.buyer_id) {
            warn!(
                target: "security",
                purchase_id = %purchase.id,
                "Client payment relayed by a user who does not own the purchase"
            );
            return Err(PurchaseError::NotAuthorized(purchase.id));
        }

        let mut confirmation = PaymentConfirmation::new(&cmd.order_ref, &cmd.payment_ref);
        match self.fetch_payment(&cmd.payment_ref).await {
            Ok(details) => {
                if let Some(order_ref) = details.order_ref.as_deref() {
                    if order_ref != cmd.order_ref {
                        warn!(
                            target: "security",
                            reported_order = order_ref,
                            "Gateway reports payment belongs to a different order"
                        );
                        return Err(PurchaseError::VerificationFailed(
                            VerificationKind::ClientRelay,
                        ));
                    }
                }
                confirmation.payment_method = details.method;
                confirmation.settled_amount = details.settled_amount;
            }
            Err(e) => {
                // Signature already proves capture; method and amount stay as recorded.
                warn!(error = %e, "Could not fetch payment details, completing without them");
            }
        }

        self.reconciler
            .handle(ReconcilePaymentCommand {
                confirmation,
                source: ConfirmationSource::ClientRelay,
            })
            .await
    }

    async fn fetch_payment(&self, payment_ref: &str) -> Result<PaymentDetails, GatewayError> {
        retry_with_backoff(
            &self.fetch_policy,
            "gateway.fetch_payment",
            |e: &GatewayError| e.retryable,
            || with_timeout(self.gateway_timeout, self.gateway.fetch_payment(payment_ref)),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::alerts::RecordingInconsistencyReporter;
    use crate::adapters::memory::{
        InMemoryBuyerDirectory, InMemoryCourseRoster, InMemoryPurchaseRepository,
    };
    use crate::adapters::mock::{MockMethod, MockPaymentGateway};
    use crate::application::handlers::purchase::EnrollmentFanout;
    use crate::domain::foundation::{CourseId, Currency, Money};
    use crate::domain::purchase::{CompletionOutcome, GatewayKind, Purchase, PurchaseStatus};

    struct Fixture {
        repo: Arc<InMemoryPurchaseRepository>,
        buyers: Arc<InMemoryBuyerDirectory>,
        gateway: Arc<MockPaymentGateway>,
        handler: VerifyClientPaymentHandler,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryPurchaseRepository::new());
        let buyers = Arc::new(InMemoryBuyerDirectory::new());
        let roster = Arc::new(InMemoryCourseRoster::new());
        let reporter = Arc::new(RecordingInconsistencyReporter::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let fanout = EnrollmentFanout::new(
            repo.clone(),
            buyers.clone(),
            roster,
            reporter.clone(),
            RetryPolicy::default(),
        );
        let reconciler = Arc::new(ReconcilePaymentHandler::new(repo.clone(), fanout, reporter));
        let handler = VerifyClientPaymentHandler::new(
            repo.clone(),
            gateway.clone(),
            reconciler,
            Duration::from_secs(1),
            RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2)),
        );
        Fixture {
            repo,
            buyers,
            gateway,
            handler,
        }
    }

    fn buyer() -> UserId {
        UserId::new("buyer-1").unwrap()
    }

    async fn seed_pending(repo: &InMemoryPurchaseRepository, order_ref: &str) -> Purchase {
        let mut purchase = Purchase::initiate(
            buyer(),
            CourseId::new(),
            Money::from_minor(199_900, Currency::inr()).unwrap(),
            GatewayKind::Mock,
        );
        purchase.attach_order(order_ref).unwrap();
        repo.insert(&purchase).await.unwrap();
        purchase
    }

    fn cmd(gateway: &MockPaymentGateway, order_ref: &str, payment_ref: &str) -> VerifyClientPaymentCommand {
        VerifyClientPaymentCommand {
            buyer_id: buyer(),
            order_ref: order_ref.to_string(),
            payment_ref: payment_ref.to_string(),
            signature: gateway.sign_client(order_ref, payment_ref),
        }
    }

    #[tokio::test]
    async fn valid_signature_completes_with_gateway_details() {
        let f = fixture();
        let seeded = seed_pending(&f.repo, "order_1").await;
        f.gateway.set_payment(PaymentDetails {
            payment_ref: "pay_1".to_string(),
            order_ref: Some("order_1".to_string()),
            method: Some("card".to_string()),
            settled_amount: Some(199_900),
        });

        let result = f.handler.handle(cmd(&f.gateway, "order_1", "pay_1")).await.unwrap();

        assert_eq!(result.outcome, CompletionOutcome::Applied);
        assert_eq!(result.purchase.payment_method.as_deref(), Some("card"));
        assert!(f.buyers.is_enrolled(&seeded.buyer_id, &seeded.course_id).await);
    }

    #[tokio::test]
    async fn forged_signature_is_rejected_before_lookup() {
        let f = fixture();
        seed_pending(&f.repo, "order_1").await;
        let mut command = cmd(&f.gateway, "order_1", "pay_1");
        command.signature = f.gateway.sign_client("order_1", "pay_other");

        let err = f.handler.handle(command).await.unwrap_err();

        assert_eq!(err, PurchaseError::VerificationFailed(VerificationKind::ClientRelay));
        let stored = f.repo.find_by_order_ref("order_1").await.unwrap().unwrap();
        assert_eq!(stored.status, PurchaseStatus::Pending);
    }

    #[tokio::test]
    async fn other_buyer_cannot_confirm() {
        let f = fixture();
        let seeded = seed_pending(&f.repo, "order_1").await;
        let mut command = cmd(&f.gateway, "order_1", "pay_1");
        command.buyer_id = UserId::new("intruder").unwrap();

        let err = f.handler.handle(command).await.unwrap_err();

        assert_eq!(err, PurchaseError::NotAuthorized(seeded.id));
    }

    #[tokio::test]
    async fn fetch_failure_still_completes() {
        let f = fixture();
        seed_pending(&f.repo, "order_1").await;
        f.gateway
            .fail_method(MockMethod::FetchPayment, GatewayError::network("connection reset"));

        let result = f.handler.handle(cmd(&f.gateway, "order_1", "pay_1")).await.unwrap();

        assert_eq!(result.purchase.status, PurchaseStatus::Completed);
        assert!(result.purchase.payment_method.is_none());
        assert_eq!(f.gateway.call_count(MockMethod::FetchPayment), 2);
    }

    #[tokio::test]
    async fn payment_for_another_order_is_rejected() {
        let f = fixture();
        seed_pending(&f.repo, "order_1").await;
        f.gateway.set_payment(PaymentDetails {
            payment_ref: "pay_1".to_string(),
            order_ref: Some("order_9".to_string()),
            method: None,
            settled_amount: None,
        });

        let err = f.handler.handle(cmd(&f.gateway, "order_1", "pay_1")).await.unwrap_err();

        assert_eq!(err, PurchaseError::VerificationFailed(VerificationKind::ClientRelay));
    }

    #[tokio::test]
    async fn empty_fields_are_validation_errors() {
        let f = fixture();
        let mut command = cmd(&f.gateway, "order_1", "pay_1");
        command.payment_ref = "  ".to_string();

        let err = f.handler.handle(command).await.unwrap_err();

        assert!(matches!(err, PurchaseError::ValidationFailed { ref field, .. } if field == "paymentId"));
    }
}
