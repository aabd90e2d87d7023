//! In-memory enrollment views: the buyer's course set and the course roster.
//!
//! Both support write-failure injection so fan-out retry paths can be
//! exercised deterministically.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{CourseId, DomainError, Timestamp, UserId};
use crate::ports::{BuyerDirectory, CourseRoster, Enrollment};

fn take_failure(counter: &AtomicU32, view: &str) -> Result<(), DomainError> {
    match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
        Ok(_) => Err(DomainError::database(format!("injected {} write failure", view))),
        Err(_) => Ok(()),
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Buyer directory
// ════════════════════════════════════════════════════════════════════════════════

/// Known buyers and their enrolled courses.
#[derive(Default)]
pub struct InMemoryBuyerDirectory {
    buyers: RwLock<HashMap<UserId, Vec<Enrollment>>>,
    failing_writes: AtomicU32,
}

impl InMemoryBuyerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a buyer with no enrollments.
    pub async fn add_buyer(&self, buyer_id: UserId) {
        self.buyers.write().await.entry(buyer_id).or_default();
    }

    pub async fn is_enrolled(&self, buyer_id: &UserId, course_id: &CourseId) -> bool {
        self.buyers
            .read()
            .await
            .get(buyer_id)
            .map(|e| e.iter().any(|e| &e.course_id == course_id))
            .unwrap_or(false)
    }

    /// Makes the next `n` enrollment writes fail.
    pub fn fail_next_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl BuyerDirectory for InMemoryBuyerDirectory {
    async fn buyer_exists(&self, buyer_id: &UserId) -> Result<bool, DomainError> {
        Ok(self.buyers.read().await.contains_key(buyer_id))
    }

    async fn add_enrollment(
        &self,
        buyer_id: &UserId,
        course_id: &CourseId,
        enrolled_at: Timestamp,
    ) -> Result<(), DomainError> {
        take_failure(&self.failing_writes, "buyer directory")?;
        let mut buyers = self.buyers.write().await;
        let enrollments = buyers.entry(buyer_id.clone()).or_default();
        if !enrollments.iter().any(|e| &e.course_id == course_id) {
            enrollments.push(Enrollment {
                course_id: *course_id,
                enrolled_at,
            });
        }
        Ok(())
    }

    async fn remove_enrollment(
        &self,
        buyer_id: &UserId,
        course_id: &CourseId,
    ) -> Result<(), DomainError> {
        take_failure(&self.failing_writes, "buyer directory")?;
        if let Some(enrollments) = self.buyers.write().await.get_mut(buyer_id) {
            enrollments.retain(|e| &e.course_id != course_id);
        }
        Ok(())
    }

    async fn enrollments(&self, buyer_id: &UserId) -> Result<Vec<Enrollment>, DomainError> {
        Ok(self
            .buyers
            .read()
            .await
            .get(buyer_id)
            .cloned()
            .unwrap_or_default())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Course roster
// ════════════════════════════════════════════════════════════════════════════════

/// Students enrolled per course.
#[derive(Default)]
pub struct InMemoryCourseRoster {
    rosters: RwLock<HashMap<CourseId, HashSet<UserId>>>,
    failing_writes: AtomicU32,
}

impl InMemoryCourseRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn students(&self, course_id: &CourseId) -> Vec<UserId> {
        self.rosters
            .read()
            .await
            .get(course_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Makes the next `n` roster writes fail.
    pub fn fail_next_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl CourseRoster for InMemoryCourseRoster {
    async fn add_student(&self, course_id: &CourseId, buyer_id: &UserId) -> Result<(), DomainError> {
        take_failure(&self.failing_writes, "course roster")?;
        self.rosters
            .write()
            .await
            .entry(*course_id)
            .or_default()
            .insert(buyer_id.clone());
        Ok(())
    }

    async fn remove_student(
        &self,
        course_id: &CourseId,
        buyer_id: &UserId,
    ) -> Result<(), DomainError> {
        take_failure(&self.failing_writes, "course roster")?;
        if let Some(students) = self.rosters.write().await.get_mut(course_id) {
            students.remove(buyer_id);
        }
        Ok(())
    }

    async fn has_student(&self, course_id: &CourseId, buyer_id: &UserId) -> Result<bool, DomainError> {
        Ok(self
            .rosters
            .read()
            .await
            .get(course_id)
            .map(|s| s.contains(buyer_id))
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repeated_enrollment_keeps_first_timestamp() {
        let directory = InMemoryBuyerDirectory::new();
        let buyer = UserId::new("buyer-1").unwrap();
        let course = CourseId::new();
        let first = Timestamp::now().add_days(-1);

        directory.add_enrollment(&buyer, &course, first).await.unwrap();
        directory
            .add_enrollment(&buyer, &course, Timestamp::now())
            .await
            .unwrap();

        let enrollments = directory.enrollments(&buyer).await.unwrap();
        assert_eq!(enrollments.len(), 1);
        assert_eq!(enrollments[0].enrolled_at, first);
    }

    #[tokio::test]
    async fn roster_is_a_set() {
        let roster = InMemoryCourseRoster::new();
        let buyer = UserId::new("buyer-1").unwrap();
        let course = CourseId::new();

        roster.add_student(&course, &buyer).await.unwrap();
        roster.add_student(&course, &buyer).await.unwrap();

        assert_eq!(roster.students(&course).await.len(), 1);
    }

    #[tokio::test]
    async fn injected_failures_leave_views_untouched() {
        let roster = InMemoryCourseRoster::new();
        let buyer = UserId::new("buyer-1").unwrap();
        let course = CourseId::new();
        roster.fail_next_writes(1);

        assert!(roster.add_student(&course, &buyer).await.is_err());
        assert!(!roster.has_student(&course, &buyer).await.unwrap());
        assert!(roster.add_student(&course, &buyer).await.is_ok());
    }
}
