//! In-memory purchase ledger.
//!
//! Enforces the same uniqueness rules as the Postgres schema: one row per
//! gateway order reference and one completed purchase per (buyer, course).
//! Both checks and the status compare-and-swap run under a single write
//! lock, so concurrent reconcilers see the same serialization a database
//! transaction would give them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{
    CourseId, DomainError, ErrorCode, PurchaseId, Timestamp, UserId,
};
use crate::domain::purchase::{Purchase, PurchaseStatus};
use crate::ports::PurchaseRepository;

/// In-memory implementation of [`PurchaseRepository`].
#[derive(Default)]
pub struct InMemoryPurchaseRepository {
    purchases: RwLock<HashMap<PurchaseId, Purchase>>,
    failing_writes: AtomicU32,
}

impl InMemoryPurchaseRepository {
    pub fn new() -> Self {
        Self::default()
    }

    // === Test Helpers ===

    /// Every stored purchase, oldest first.
    pub async fn all(&self) -> Vec<Purchase> {
        let mut all: Vec<_> = self.purchases.read().await.values().cloned().collect();
        all.sort_by_key(|p| p.created_at);
        all
    }

    /// Stores a purchase as-is, bypassing uniqueness and status checks.
    pub async fn put(&self, purchase: Purchase) {
        self.purchases.write().await.insert(purchase.id, purchase);
    }

    /// Makes the next `n` writes fail with a database error.
    pub fn fail_next_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    fn check_write(&self) -> Result<(), DomainError> {
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match injected {
            Ok(_) => Err(DomainError::database("injected write failure")),
            Err(_) => Ok(()),
        }
    }

    /// Rejects `candidate` if it would break a uniqueness rule against any
    /// other stored purchase.
    fn check_unique(
        purchases: &HashMap<PurchaseId, Purchase>,
        candidate: &Purchase,
    ) -> Result<(), DomainError> {
        for other in purchases.values().filter(|p| p.id != candidate.id) {
            if candidate.gateway_order_ref.is_some()
                && other.gateway_order_ref == candidate.gateway_order_ref
            {
                return Err(DomainError::new(
                    ErrorCode::DuplicateOrderRef,
                    "gateway order reference already recorded",
                )
                .with_detail("purchase_id", other.id.to_string()));
            }
            if candidate.status == PurchaseStatus::Completed
                && other.status == PurchaseStatus::Completed
                && other.buyer_id == candidate.buyer_id
                && other.course_id == candidate.course_id
            {
                return Err(DomainError::new(
                    ErrorCode::DuplicateCompletion,
                    "buyer already holds a completed purchase of this course",
                )
                .with_detail("purchase_id", other.id.to_string()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PurchaseRepository for InMemoryPurchaseRepository {
    async fn insert(&self, purchase: &Purchase) -> Result<(), DomainError> {
        self.check_write()?;
        let mut purchases = self.purchases.write().await;
        if purchases.contains_key(&purchase.id) {
            return Err(DomainError::database(format!(
                "purchase {} already exists",
                purchase.id
            )));
        }
        Self::check_unique(&purchases, purchase)?;
        purchases.insert(purchase.id, purchase.clone());
        Ok(())
    }

    async fn update_if_status(
        &self,
        purchase: &Purchase,
        expected: PurchaseStatus,
    ) -> Result<bool, DomainError> {
        self.check_write()?;
        let mut purchases = self.purchases.write().await;
        match purchases.get(&purchase.id) {
            Some(current) if current.status == expected => {}
            _ => return Ok(false),
        }
        Self::check_unique(&purchases, purchase)?;
        purchases.insert(purchase.id, purchase.clone());
        Ok(true)
    }

    async fn find_by_id(&self, id: &PurchaseId) -> Result<Option<Purchase>, DomainError> {
        Ok(self.purchases.read().await.get(id).cloned())
    }

    async fn find_by_order_ref(&self, order_ref: &str) -> Result<Option<Purchase>, DomainError> {
        Ok(self
            .purchases
            .read()
            .await
            .values()
            .find(|p| p.gateway_order_ref.as_deref() == Some(order_ref))
            .cloned())
    }

    async fn find_completed(
        &self,
        buyer_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Purchase>, DomainError> {
        Ok(self
            .purchases
            .read()
            .await
            .values()
            .find(|p| {
                p.status == PurchaseStatus::Completed
                    && &p.buyer_id == buyer_id
                    && &p.course_id == course_id
            })
            .cloned())
    }

    async fn find_latest(
        &self,
        buyer_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Purchase>, DomainError> {
        Ok(self
            .purchases
            .read()
            .await
            .values()
            .filter(|p| &p.buyer_id == buyer_id && &p.course_id == course_id)
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn list_by_buyer(
        &self,
        buyer_id: &UserId,
        status: Option<PurchaseStatus>,
    ) -> Result<Vec<Purchase>, DomainError> {
        let mut found: Vec<_> = self
            .purchases
            .read()
            .await
            .values()
            .filter(|p| &p.buyer_id == buyer_id && status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn list_by_status(
        &self,
        status: PurchaseStatus,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Purchase>, DomainError> {
        let mut found: Vec<_> = self
            .purchases
            .read()
            .await
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect();
        found.sort_by_key(|p| p.created_at);
        Ok(found
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn find_stale_pending(
        &self,
        created_before: Timestamp,
        limit: u32,
    ) -> Result<Vec<Purchase>, DomainError> {
        let mut found: Vec<_> = self
            .purchases
            .read()
            .await
            .values()
            .filter(|p| {
                p.status == PurchaseStatus::Pending
                    && p.gateway_order_ref.is_none()
                    && p.created_at.is_before(&created_before)
            })
            .cloned()
            .collect();
        found.sort_by_key(|p| p.created_at);
        found.truncate(limit as usize);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{Currency, Money};
    use crate::domain::purchase::{GatewayKind, PaymentConfirmation};

    fn pending(buyer: &str, course: CourseId) -> Purchase {
        Purchase::initiate(
            UserId::new(buyer).unwrap(),
            course,
            Money::from_minor(50_000, Currency::inr()).unwrap(),
            GatewayKind::Mock,
        )
    }

    #[tokio::test]
    async fn update_applies_only_from_expected_status() {
        let repo = InMemoryPurchaseRepository::new();
        let mut purchase = pending("buyer-1", CourseId::new());
        repo.insert(&purchase).await.unwrap();

        purchase.attach_order("order_1").unwrap();
        assert!(repo
            .update_if_status(&purchase, PurchaseStatus::Pending)
            .await
            .unwrap());

        purchase.fail("declined").unwrap();
        assert!(!repo
            .update_if_status(&purchase, PurchaseStatus::Completed)
            .await
            .unwrap());
        let stored = repo.find_by_id(&purchase.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PurchaseStatus::Pending);
    }

    #[tokio::test]
    async fn order_ref_is_unique() {
        let repo = InMemoryPurchaseRepository::new();
        let mut first = pending("buyer-1", CourseId::new());
        first.attach_order("order_1").unwrap();
        repo.insert(&first).await.unwrap();

        let mut second = pending("buyer-2", CourseId::new());
        repo.insert(&second).await.unwrap();
        second.attach_order("order_1").unwrap();

        let err = repo
            .update_if_status(&second, PurchaseStatus::Pending)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateOrderRef);
    }

    #[tokio::test]
    async fn second_completion_for_pair_is_rejected() {
        let repo = InMemoryPurchaseRepository::new();
        let course = CourseId::new();
        let mut first = pending("buyer-1", course);
        let mut second = pending("buyer-1", course);
        first.attach_order("order_1").unwrap();
        second.attach_order("order_2").unwrap();
        repo.insert(&first).await.unwrap();
        repo.insert(&second).await.unwrap();

        first
            .complete(&PaymentConfirmation::new("order_1", "pay_1"))
            .unwrap();
        second
            .complete(&PaymentConfirmation::new("order_2", "pay_2"))
            .unwrap();
        assert!(repo
            .update_if_status(&first, PurchaseStatus::Pending)
            .await
            .unwrap());

        let err = repo
            .update_if_status(&second, PurchaseStatus::Pending)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateCompletion);
    }

    #[tokio::test]
    async fn stale_pending_excludes_rows_with_orders() {
        let repo = InMemoryPurchaseRepository::new();
        let orphan = pending("buyer-1", CourseId::new());
        let mut ordered = pending("buyer-2", CourseId::new());
        ordered.attach_order("order_1").unwrap();
        repo.insert(&orphan).await.unwrap();
        repo.insert(&ordered).await.unwrap();

        let stale = repo
            .find_stale_pending(Timestamp::now().add_days(1), 10)
            .await
            .unwrap();

        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, orphan.id);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let repo = InMemoryPurchaseRepository::new();
        repo.fail_next_writes(1);

        assert!(repo.insert(&pending("buyer-1", CourseId::new())).await.is_err());
        assert!(repo.insert(&pending("buyer-1", CourseId::new())).await.is_ok());
    }
}
