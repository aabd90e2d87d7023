//! HandleGatewayWebhookHandler - authenticates and dispatches gateway webhooks.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::foundation::PurchaseId;
use crate::domain::purchase::{CompletionOutcome, GatewayEvent, PurchaseError, VerificationKind};
use crate::ports::PaymentGateway;

use super::reconcile_payment::{
    ConfirmationSource, PaymentFailureOutcome, ReconcilePaymentCommand, ReconcilePaymentHandler,
};

/// Command to handle a gateway webhook.
#[derive(Debug, Clone)]
pub struct HandleGatewayWebhookCommand {
    /// Raw body exactly as received.
    pub payload: Vec<u8>,
    /// Signature header value, if the request carried one.
    pub signature: Option<String>,
}

/// Result of webhook processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleGatewayWebhookResult {
    /// Payment captured and the purchase completed by this delivery.
    PurchaseCompleted { purchase_id: PurchaseId },
    /// Redelivery of a confirmation already applied.
    AlreadyCompleted { purchase_id: PurchaseId },
    /// Gateway reported the payment failed.
    PurchaseFailed { purchase_id: PurchaseId },
    /// Authentic event that required no action.
    Ignored { event_type: String },
}

/// Handler for gateway webhooks.
///
/// Nothing in the payload is trusted until the signature over the raw body
/// checks out.
pub struct HandleGatewayWebhookHandler {
    gateway: Arc<dyn PaymentGateway>,
    reconciler: Arc<ReconcilePaymentHandler>,
}

impl HandleGatewayWebhookHandler {
    pub fn new(gateway: Arc<dyn PaymentGateway>, reconciler: Arc<ReconcilePaymentHandler>) -> Self {
        Self {
            gateway,
            reconciler,
        }
    }

    #[tracing::instrument(skip_all, fields(gateway = %self.gateway.kind()))]
    pub async fn handle(
        &self,
        cmd: HandleGatewayWebhookCommand,
    ) -> Result<HandleGatewayWebhookResult, PurchaseError> {
        let Some(signature) = cmd.signature.as_deref().filter(|s| !s.trim().is_empty()) else {
            warn!(
                target: "security",
                header = self.gateway.signature_header(),
                "Webhook rejected: missing signature"
            );
            return Err(PurchaseError::VerificationFailed(VerificationKind::Webhook));
        };

        let event = match self.gateway.verify_webhook(&cmd.payload, signature).await {
            Ok(event) => event,
            Err(e) => {
                if e.is_authentication_failure() {
                    warn!(target: "security", error = %e, "Webhook rejected: signature verification failed");
                } else {
                    warn!(error = %e, "Webhook rejected: malformed payload");
                }
                return Err(e.into());
            }
        };

        debug!(event_id = event.event_id(), "Webhook verified");

        match event {
            GatewayEvent::PaymentCaptured { confirmation, .. } => {
                let result = self
                    .reconciler
                    .handle(ReconcilePaymentCommand {
                        confirmation,
                        source: ConfirmationSource::Webhook,
                    })
                    .await?;
                let purchase_id = result.purchase.id;
                Ok(match result.outcome {
                    CompletionOutcome::Applied => {
                        HandleGatewayWebhookResult::PurchaseCompleted { purchase_id }
                    }
                    CompletionOutcome::AlreadyApplied => {
                        HandleGatewayWebhookResult::AlreadyCompleted { purchase_id }
                    }
                })
            }
            GatewayEvent::PaymentFailed {
                order_ref, reason, ..
            } => match self.reconciler.mark_failed(&order_ref, &reason).await? {
                PaymentFailureOutcome::MarkedFailed(purchase) => {
                    Ok(HandleGatewayWebhookResult::PurchaseFailed {
                        purchase_id: purchase.id,
                    })
                }
                PaymentFailureOutcome::Ignored => Ok(HandleGatewayWebhookResult::Ignored {
                    event_type: "payment.failed".to_string(),
                }),
            },
            GatewayEvent::Ignored { event_type, .. } => {
                debug!(event_type = %event_type, "Webhook event ignored");
                Ok(HandleGatewayWebhookResult::Ignored { event_type })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::alerts::RecordingInconsistencyReporter;
    use crate::adapters::memory::{
        InMemoryBuyerDirectory, InMemoryCourseRoster, InMemoryPurchaseRepository,
    };
    use crate::adapters::mock::MockPaymentGateway;
    use crate::application::handlers::purchase::{EnrollmentFanout, RetryPolicy};
    use crate::domain::foundation::{CourseId, Currency, Money, UserId};
    use crate::domain::purchase::{GatewayKind, Purchase, PurchaseStatus};
    use crate::ports::PurchaseRepository;
    use serde_json::json;

    struct Fixture {
        repo: Arc<InMemoryPurchaseRepository>,
        roster: Arc<InMemoryCourseRoster>,
        gateway: Arc<MockPaymentGateway>,
        handler: HandleGatewayWebhookHandler,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryPurchaseRepository::new());
        let buyers = Arc::new(InMemoryBuyerDirectory::new());
        let roster = Arc::new(InMemoryCourseRoster::new());
        let reporter = Arc::new(RecordingInconsistencyReporter::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let fanout = EnrollmentFanout::new(
            repo.clone(),
            buyers,
            roster.clone(),
            reporter.clone(),
            RetryPolicy::default(),
        );
        let reconciler = Arc::new(ReconcilePaymentHandler::new(repo.clone(), fanout, reporter));
        let handler = HandleGatewayWebhookHandler::new(gateway.clone(), reconciler);
        Fixture {
            repo,
            roster,
            gateway,
            handler,
        }
    }

    async fn seed_pending(repo: &InMemoryPurchaseRepository, order_ref: &str) -> Purchase {
        let mut purchase = Purchase::initiate(
            UserId::new("buyer-1").unwrap(),
            CourseId::new(),
            Money::from_minor(199_900, Currency::inr()).unwrap(),
            GatewayKind::Mock,
        );
        purchase.attach_order(order_ref).unwrap();
        repo.insert(&purchase).await.unwrap();
        purchase
    }

    fn signed(gateway: &MockPaymentGateway, body: serde_json::Value) -> HandleGatewayWebhookCommand {
        let payload = serde_json::to_vec(&body).unwrap();
        HandleGatewayWebhookCommand {
            signature: Some(gateway.sign_webhook(&payload)),
            payload,
        }
    }

    #[tokio::test]
    async fn captured_event_completes_purchase() {
        let f = fixture();
        let seeded = seed_pending(&f.repo, "order_1").await;
        let cmd = signed(
            &f.gateway,
            json!({"id": "evt_1", "type": "payment.captured", "orderRef": "order_1", "paymentRef": "pay_1"}),
        );

        let result = f.handler.handle(cmd).await.unwrap();

        assert_eq!(
            result,
            HandleGatewayWebhookResult::PurchaseCompleted {
                purchase_id: seeded.id
            }
        );
        assert_eq!(f.roster.students(&seeded.course_id).await.len(), 1);
    }

    #[tokio::test]
    async fn redelivered_event_reports_already_completed() {
        let f = fixture();
        let seeded = seed_pending(&f.repo, "order_1").await;
        let body = json!({"id": "evt_1", "type": "payment.captured", "orderRef": "order_1", "paymentRef": "pay_1"});

        f.handler.handle(signed(&f.gateway, body.clone())).await.unwrap();
        let result = f.handler.handle(signed(&f.gateway, body)).await.unwrap();

        assert_eq!(
            result,
            HandleGatewayWebhookResult::AlreadyCompleted {
                purchase_id: seeded.id
            }
        );
    }

    #[tokio::test]
    async fn tampered_body_is_rejected_without_mutation() {
        let f = fixture();
        seed_pending(&f.repo, "o1").await;
        let original = serde_json::to_vec(
            &json!({"id": "evt_1", "type": "payment.captured", "orderRef": "o1", "paymentRef": "pay_1", "amount": 100}),
        )
        .unwrap();
        let tampered = serde_json::to_vec(
            &json!({"id": "evt_1", "type": "payment.captured", "orderRef": "o1", "paymentRef": "pay_1", "amount": 500}),
        )
        .unwrap();

        let err = f
            .handler
            .handle(HandleGatewayWebhookCommand {
                signature: Some(f.gateway.sign_webhook(&original)),
                payload: tampered,
            })
            .await
            .unwrap_err();

        assert_eq!(err, PurchaseError::VerificationFailed(VerificationKind::Webhook));
        let stored = f.repo.find_by_order_ref("o1").await.unwrap().unwrap();
        assert_eq!(stored.status, PurchaseStatus::Pending);
    }

    #[tokio::test]
    async fn missing_signature_is_rejected() {
        let f = fixture();

        let err = f
            .handler
            .handle(HandleGatewayWebhookCommand {
                payload: b"{}".to_vec(),
                signature: None,
            })
            .await
            .unwrap_err();

        assert_eq!(err, PurchaseError::VerificationFailed(VerificationKind::Webhook));
    }

    #[tokio::test]
    async fn failed_event_marks_purchase_failed() {
        let f = fixture();
        let seeded = seed_pending(&f.repo, "order_1").await;
        let cmd = signed(
            &f.gateway,
            json!({"id": "evt_2", "type": "payment.failed", "orderRef": "order_1", "reason": "declined"}),
        );

        let result = f.handler.handle(cmd).await.unwrap();

        assert_eq!(
            result,
            HandleGatewayWebhookResult::PurchaseFailed {
                purchase_id: seeded.id
            }
        );
    }

    #[tokio::test]
    async fn unrelated_event_is_ignored() {
        let f = fixture();
        let cmd = signed(&f.gateway, json!({"id": "evt_3", "type": "refund.processed"}));

        let result = f.handler.handle(cmd).await.unwrap();

        assert_eq!(
            result,
            HandleGatewayWebhookResult::Ignored {
                event_type: "refund.processed".to_string()
            }
        );
    }
}
