//! InitiateCheckoutHandler - opens a purchase and a gateway order for it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::domain::foundation::{CourseId, ErrorCode, UserId};
use crate::domain::purchase::{Purchase, PurchaseError, PurchaseStatus};
use crate::ports::{
    BuyerDirectory, CheckoutArtifact, CourseCatalog, CreateOrderRequest, PaymentGateway,
    PurchaseRepository,
};

use super::retry::with_timeout;

/// Command to start a checkout.
#[derive(Debug, Clone)]
pub struct InitiateCheckoutCommand {
    pub buyer_id: UserId,
    pub course_id: CourseId,
}

/// Result of successful checkout initiation.
#[derive(Debug, Clone)]
pub struct InitiateCheckoutResult {
    /// Pending purchase with its gateway order attached.
    pub purchase: Purchase,
    /// What the client needs to continue the checkout.
    pub checkout: CheckoutArtifact,
}

/// Handler for opening purchases.
///
/// The purchase is persisted as `pending` before the gateway is called so
/// that every gateway order has a ledger row. Any gateway failure, timeout
/// or amount mismatch marks that row `failed`; it is never left pending
/// without an order.
pub struct InitiateCheckoutHandler {
    repository: Arc<dyn PurchaseRepository>,
    catalog: Arc<dyn CourseCatalog>,
    buyers: Arc<dyn BuyerDirectory>,
    gateway: Arc<dyn PaymentGateway>,
    gateway_timeout: Duration,
}

impl InitiateCheckoutHandler {
    pub fn new(
        repository: Arc<dyn PurchaseRepository>,
        catalog: Arc<dyn CourseCatalog>,
        buyers: Arc<dyn BuyerDirectory>,
        gateway: Arc<dyn PaymentGateway>,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            catalog,
            buyers,
            gateway,
            gateway_timeout,
        }
    }

    #[tracing::instrument(skip_all, fields(buyer_id = %cmd.buyer_id, course_id = %cmd.course_id))]
    pub async fn handle(
        &self,
        cmd: InitiateCheckoutCommand,
    ) -> Result<InitiateCheckoutResult, PurchaseError> {
        // 1. Course and buyer must exist
        let course = self
            .catalog
            .get_course(&cmd.course_id)
            .await?
            .ok_or(PurchaseError::CourseNotFound(cmd.course_id))?;

        if !self.buyers.buyer_exists(&cmd.buyer_id).await? {
            return Err(PurchaseError::BuyerNotFound(cmd.buyer_id));
        }

        // 2. No second purchase of an owned course
        if self
            .repository
            .find_completed(&cmd.buyer_id, &cmd.course_id)
            .await?
            .is_some()
        {
            return Err(PurchaseError::AlreadyPurchased {
                buyer_id: cmd.buyer_id,
                course_id: cmd.course_id,
            });
        }

        // 3. Persist pending purchase with the price snapshot
        let mut purchase = Purchase::initiate(
            cmd.buyer_id,
            cmd.course_id,
            course.price.clone(),
            self.gateway.kind(),
        );
        self.repository.insert(&purchase).await?;

        // 4. Open the gateway order for exactly the snapshot amount
        let request = CreateOrderRequest {
            purchase_id: purchase.id,
            buyer_id: purchase.buyer_id.clone(),
            course_id: purchase.course_id,
            course_title: course.title,
            amount: purchase.amount.clone(),
        };
        let order = match with_timeout(self.gateway_timeout, self.gateway.create_order(request)).await
        {
            Ok(order) => order,
            Err(e) => {
                error!(purchase_id = %purchase.id, error = %e, "Gateway order creation failed");
                let err = PurchaseError::from(e);
                self.abandon(&mut purchase, &err.detail()).await;
                return Err(err);
            }
        };

        // 5. Gateway must echo what we asked for
        let currency_matches = order
            .currency
            .eq_ignore_ascii_case(purchase.amount.currency.as_str());
        if order.amount != purchase.amount.minor_units || !currency_matches {
            warn!(
                purchase_id = %purchase.id,
                order_ref = %order.order_ref,
                requested = purchase.amount.minor_units,
                echoed = order.amount,
                echoed_currency = %order.currency,
                "Gateway echoed a different amount"
            );
            let err = PurchaseError::AmountMismatch {
                expected: purchase.amount.minor_units,
                actual: order.amount,
            };
            self.abandon(&mut purchase, &err.detail()).await;
            return Err(err);
        }

        // 6. Attach the order reference
        purchase.attach_order(&order.order_ref)?;
        match self
            .repository
            .update_if_status(&purchase, PurchaseStatus::Pending)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                let current = self
                    .repository
                    .find_by_id(&purchase.id)
                    .await?
                    .map(|p| p.status)
                    .unwrap_or(PurchaseStatus::Failed);
                return Err(PurchaseError::invalid_state(
                    purchase.id,
                    current,
                    "attach an order to",
                ));
            }
            Err(e) if e.code == ErrorCode::DuplicateOrderRef => {
                let err = PurchaseError::anomaly(
                    purchase.id,
                    format!("gateway reused order reference {}", order.order_ref),
                );
                purchase.gateway_order_ref = None;
                self.abandon(&mut purchase, &err.detail()).await;
                return Err(err);
            }
            Err(e) => {
                error!(
                    purchase_id = %purchase.id,
                    order_ref = %order.order_ref,
                    error = %e,
                    "Could not attach gateway order"
                );
                self.abandon(&mut purchase, &e.message).await;
                return Err(e.into());
            }
        }

        info!(
            purchase_id = %purchase.id,
            order_ref = %order.order_ref,
            amount = purchase.amount.minor_units,
            "Checkout initiated"
        );

        Ok(InitiateCheckoutResult {
            purchase,
            checkout: order.checkout,
        })
    }

    /// Marks the freshly inserted purchase failed. Best effort: the sweep
    /// expires it later if this write does not land.
    async fn abandon(&self, purchase: &mut Purchase, reason: &str) {
        if let Err(e) = purchase.fail(reason) {
            warn!(purchase_id = %purchase.id, error = %e, "Could not mark purchase failed");
            return;
        }
        if let Err(e) = self
            .repository
            .update_if_status(purchase, PurchaseStatus::Pending)
            .await
        {
            warn!(purchase_id = %purchase.id, error = %e, "Could not persist failed purchase");
        }
    }
}
