//! Purchase repository port (write side of the ledger).
//!
//! # Design
//!
//! - **Compare-and-swap writes**: every status change goes through
//!   [`PurchaseRepository::update_if_status`], which only writes when the
//!   stored status still equals the status the caller read. This is the
//!   single serialization point for concurrent confirmations.
//! - **Uniqueness in storage**: `gateway_order_ref` is unique, and at most
//!   one purchase per (buyer, course) may be `completed`. Violations surface
//!   as `DuplicateOrderRef` / `DuplicateCompletion` domain errors.

use async_trait::async_trait;

use crate::domain::foundation::{CourseId, DomainError, PurchaseId, Timestamp, UserId};
use crate::domain::purchase::{Purchase, PurchaseStatus};

/// Repository port for Purchase aggregate persistence.
#[async_trait]
pub trait PurchaseRepository: Send + Sync {
    /// Inserts a new purchase.
    ///
    /// # Errors
    ///
    /// - `DuplicateOrderRef` if the gateway order ref is already used
    /// - `DatabaseError` on persistence failure
    async fn insert(&self, purchase: &Purchase) -> Result<(), DomainError>;

    /// Writes `purchase` only if the stored status equals `expected`.
    ///
    /// Returns `false` when another writer changed the status first, or
    /// the purchase does not exist.
    ///
    /// # Errors
    ///
    /// - `DuplicateCompletion` if the write would create a second
    ///   completed purchase for the same buyer and course
    /// - `DuplicateOrderRef` if the gateway order ref is already used
    /// - `DatabaseError` on persistence failure
    async fn update_if_status(
        &self,
        purchase: &Purchase,
        expected: PurchaseStatus,
    ) -> Result<bool, DomainError>;

    async fn find_by_id(&self, id: &PurchaseId) -> Result<Option<Purchase>, DomainError>;

    /// Looks up a purchase by its gateway order reference.
    async fn find_by_order_ref(&self, order_ref: &str) -> Result<Option<Purchase>, DomainError>;

    /// Returns the completed purchase for a buyer and course, if any.
    async fn find_completed(
        &self,
        buyer_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Purchase>, DomainError>;

    /// Returns the most recently created purchase for a buyer and course.
    async fn find_latest(
        &self,
        buyer_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Purchase>, DomainError>;

    /// Lists a buyer's purchases, newest first, optionally by status.
    async fn list_by_buyer(
        &self,
        buyer_id: &UserId,
        status: Option<PurchaseStatus>,
    ) -> Result<Vec<Purchase>, DomainError>;

    /// Pages through all purchases with the given status, oldest first.
    async fn list_by_status(
        &self,
        status: PurchaseStatus,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Purchase>, DomainError>;

    /// Pending purchases created before `created_before` that never
    /// received a gateway order reference.
    async fn find_stale_pending(
        &self,
        created_before: Timestamp,
        limit: u32,
    ) -> Result<Vec<Purchase>, DomainError>;
}
