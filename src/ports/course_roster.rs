//! Course roster port - the course's enrolled-student set.

use async_trait::async_trait;

use crate::domain::foundation::{CourseId, DomainError, UserId};

/// Idempotent set of students per course.
#[async_trait]
pub trait CourseRoster: Send + Sync {
    async fn add_student(&self, course_id: &CourseId, buyer_id: &UserId)
        -> Result<(), DomainError>;

    async fn remove_student(
        &self,
        course_id: &CourseId,
        buyer_id: &UserId,
    ) -> Result<(), DomainError>;

    async fn has_student(&self, course_id: &CourseId, buyer_id: &UserId)
        -> Result<bool, DomainError>;
}
