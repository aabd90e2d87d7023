//! GetPurchaseStatusHandler - Query handler for a buyer's standing on one course.

use std::sync::Arc;

use crate::domain::foundation::{CourseId, UserId};
use crate::domain::purchase::{Purchase, PurchaseError, PurchaseStatus};
use crate::ports::{BuyerDirectory, CourseCatalog, CourseListing, PurchaseRepository};

/// Query for a buyer's purchase status on a course.
#[derive(Debug, Clone)]
pub struct GetPurchaseStatusQuery {
    pub buyer_id: UserId,
    pub course_id: CourseId,
}

/// Purchase status for one course.
#[derive(Debug, Clone)]
pub struct GetPurchaseStatusResult {
    pub course: CourseListing,
    /// The completed purchase if one exists, else the latest attempt.
    pub purchase: Option<Purchase>,
    /// Whether the buyer's enrolled-course set holds the course.
    pub enrolled: bool,
}

impl GetPurchaseStatusResult {
    pub fn purchased(&self) -> bool {
        self.purchase
            .as_ref()
            .map(|p| p.status == PurchaseStatus::Completed)
            .unwrap_or(false)
    }
}

/// Handler for purchase status queries.
pub struct GetPurchaseStatusHandler {
    repository: Arc<dyn PurchaseRepository>,
    catalog: Arc<dyn CourseCatalog>,
    buyers: Arc<dyn BuyerDirectory>,
}

impl GetPurchaseStatusHandler {
    pub fn new(
        repository: Arc<dyn PurchaseRepository>,
        catalog: Arc<dyn CourseCatalog>,
        buyers: Arc<dyn BuyerDirectory>,
    ) -> Self {
        Self {
            repository,
            catalog,
            buyers,
        }
    }

    pub async fn handle(
        &self,
        query: GetPurchaseStatusQuery,
    ) -> Result<GetPurchaseStatusResult, PurchaseError> {
        let course = self
            .catalog
            .get_course(&query.course_id)
            .await?
            .ok_or(PurchaseError::CourseNotFound(query.course_id))?;

        let purchase = match self
            .repository
            .find_completed(&query.buyer_id, &query.course_id)
            .await?
        {
            Some(completed) => Some(completed),
            None => {
                self.repository
                    .find_latest(&query.buyer_id, &query.course_id)
                    .await?
            }
        };

        let enrolled = self
            .buyers
            .enrollments(&query.buyer_id)
            .await?
            .iter()
            .any(|e| e.course_id == query.course_id);

        Ok(GetPurchaseStatusResult {
            course,
            purchase,
            enrolled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryBuyerDirectory, InMemoryCourseCatalog, InMemoryPurchaseRepository,
    };
    use crate::domain::foundation::{Currency, Money, Timestamp};
    use crate::domain::purchase::{GatewayKind, PaymentConfirmation};

    struct Fixture {
        repo: Arc<InMemoryPurchaseRepository>,
        buyers: Arc<InMemoryBuyerDirectory>,
        handler: GetPurchaseStatusHandler,
        buyer_id: UserId,
        course_id: CourseId,
    }

    async fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryPurchaseRepository::new());
        let catalog = Arc::new(InMemoryCourseCatalog::new());
        let buyers = Arc::new(InMemoryBuyerDirectory::new());
        let buyer_id = UserId::new("buyer-1").unwrap();
        let course_id = CourseId::new();
        buyers.add_buyer(buyer_id.clone()).await;
        catalog
            .add_course(CourseListing {
                id: course_id,
                title: "Distributed Systems".to_string(),
                description: Some("Consensus and replication".to_string()),
                price: Money::from_major(499, Currency::inr()).unwrap(),
            })
            .await;
        let handler = GetPurchaseStatusHandler::new(repo.clone(), catalog, buyers.clone());
        Fixture {
            repo,
            buyers,
            handler,
            buyer_id,
            course_id,
        }
    }

    fn query(f: &Fixture) -> GetPurchaseStatusQuery {
        GetPurchaseStatusQuery {
            buyer_id: f.buyer_id.clone(),
            course_id: f.course_id,
        }
    }

    #[tokio::test]
    async fn no_purchase_yet() {
        let f = fixture().await;

        let result = f.handler.handle(query(&f)).await.unwrap();

        assert!(!result.purchased());
        assert!(result.purchase.is_none());
        assert!(!result.enrolled);
        assert_eq!(result.course.title, "Distributed Systems");
    }

    #[tokio::test]
    async fn completed_purchase_reports_purchased_and_enrolled() {
        let f = fixture().await;
        let mut purchase = Purchase::initiate(
            f.buyer_id.clone(),
            f.course_id,
            Money::from_major(499, Currency::inr()).unwrap(),
            GatewayKind::Mock,
        );
        purchase.attach_order("order_1").unwrap();
        purchase
            .complete(&PaymentConfirmation::new("order_1", "pay_1"))
            .unwrap();
        f.repo.insert(&purchase).await.unwrap();
        f.buyers
            .add_enrollment(&f.buyer_id, &f.course_id, Timestamp::now())
            .await
            .unwrap();

        let result = f.handler.handle(query(&f)).await.unwrap();

        assert!(result.purchased());
        assert!(result.enrolled);
        assert_eq!(result.purchase.unwrap().id, purchase.id);
    }

    #[tokio::test]
    async fn pending_attempt_is_reported_but_not_purchased() {
        let f = fixture().await;
        let purchase = Purchase::initiate(
            f.buyer_id.clone(),
            f.course_id,
            Money::from_major(499, Currency::inr()).unwrap(),
            GatewayKind::Mock,
        );
        f.repo.insert(&purchase).await.unwrap();

        let result = f.handler.handle(query(&f)).await.unwrap();

        assert!(!result.purchased());
        assert_eq!(result.purchase.unwrap().status, PurchaseStatus::Pending);
    }

    #[tokio::test]
    async fn unknown_course_is_not_found() {
        let f = fixture().await;
        let q = GetPurchaseStatusQuery {
            buyer_id: f.buyer_id.clone(),
            course_id: CourseId::new(),
        };

        let err = f.handler.handle(q).await.unwrap_err();

        assert!(matches!(err, PurchaseError::CourseNotFound(_)));
    }
}
