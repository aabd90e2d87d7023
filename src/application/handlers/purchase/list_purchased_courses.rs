//! ListPurchasedCoursesHandler - Query handler for a buyer's owned courses.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::warn;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::purchase::{Purchase, PurchaseError, PurchaseStatus};
use crate::ports::{BuyerDirectory, CourseCatalog, CourseListing, PurchaseRepository};

/// Query for the courses a buyer has purchased.
#[derive(Debug, Clone)]
pub struct ListPurchasedCoursesQuery {
    pub buyer_id: UserId,
}

/// One owned course.
#[derive(Debug, Clone)]
pub struct PurchasedCourse {
    pub course: CourseListing,
    pub purchase: Purchase,
    /// When the enrollment views recorded the course, if they have yet.
    pub enrolled_at: Option<Timestamp>,
}

/// Handler for purchased-course listings.
pub struct ListPurchasedCoursesHandler {
    repository: Arc<dyn PurchaseRepository>,
    catalog: Arc<dyn CourseCatalog>,
    buyers: Arc<dyn BuyerDirectory>,
}

impl ListPurchasedCoursesHandler {
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
        query: ListPurchasedCoursesQuery,
    ) -> Result<Vec<PurchasedCourse>, PurchaseError> {
        let purchases = self
            .repository
            .list_by_buyer(&query.buyer_id, Some(PurchaseStatus::Completed))
            .await?;

        let enrolled: HashMap<_, _> = self
            .buyers
            .enrollments(&query.buyer_id)
            .await?
            .into_iter()
            .map(|e| (e.course_id, e.enrolled_at))
            .collect();

        let courses =
            try_join_all(purchases.iter().map(|p| self.catalog.get_course(&p.course_id))).await?;

        let mut items = Vec::with_capacity(purchases.len());
        for (purchase, course) in purchases.into_iter().zip(courses) {
            let Some(course) = course else {
                warn!(
                    purchase_id = %purchase.id,
                    course_id = %purchase.course_id,
                    "Purchased course no longer in catalog"
                );
                continue;
            };
            items.push(PurchasedCourse {
                enrolled_at: enrolled.get(&purchase.course_id).copied(),
                course,
                purchase,
            });
        }

        Ok(items)
    }
}
