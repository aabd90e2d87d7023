//! Buyer directory port - the buyer's enrolled-course set.
//!
//! Writes are set operations: adding a course that is already present, or
//! removing one that is absent, succeeds without change. Fan-out relies on
//! this to retry freely.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{CourseId, DomainError, Timestamp, UserId};

/// One entry in a buyer's enrolled-course set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub course_id: CourseId,
    pub enrolled_at: Timestamp,
}

#[async_trait]
pub trait BuyerDirectory: Send + Sync {
    async fn buyer_exists(&self, buyer_id: &UserId) -> Result<bool, DomainError>;

    /// Adds the course to the buyer's set. Keeps the original timestamp
    /// if already present.
    async fn add_enrollment(
        &self,
        buyer_id: &UserId,
        course_id: &CourseId,
        enrolled_at: Timestamp,
    ) -> Result<(), DomainError>;

    async fn remove_enrollment(
        &self,
        buyer_id: &UserId,
        course_id: &CourseId,
    ) -> Result<(), DomainError>;

    async fn enrollments(&self, buyer_id: &UserId) -> Result<Vec<Enrollment>, DomainError>;
}
