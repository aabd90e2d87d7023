//! PostgreSQL enrollment views.
//!
//! Writes are set operations: `INSERT .. ON CONFLICT DO NOTHING` and plain
//! `DELETE`, so fan-out retries can repeat them freely.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{CourseId, DomainError, Timestamp, UserId};
use crate::ports::{BuyerDirectory, CourseRoster, Enrollment};

/// Buyers and their enrolled-course sets.
pub struct PostgresBuyerDirectory {
    pool: PgPool,
}

impl PostgresBuyerDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BuyerDirectory for PostgresBuyerDirectory {
    async fn buyer_exists(&self, buyer_id: &UserId) -> Result<bool, DomainError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(buyer_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to look up buyer: {}", e)))?;
        Ok(exists)
    }

    async fn add_enrollment(
        &self,
        buyer_id: &UserId,
        course_id: &CourseId,
        enrolled_at: Timestamp,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO user_enrolled_courses (user_id, course_id, enrolled_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, course_id) DO NOTHING
            "#,
        )
        .bind(buyer_id.as_str())
        .bind(course_id.as_uuid())
        .bind(enrolled_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to add enrollment: {}", e)))?;
        Ok(())
    }

    async fn remove_enrollment(
        &self,
        buyer_id: &UserId,
        course_id: &CourseId,
    ) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM user_enrolled_courses WHERE user_id = $1 AND course_id = $2")
            .bind(buyer_id.as_str())
            .bind(course_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to remove enrollment: {}", e)))?;
        Ok(())
    }

    async fn enrollments(&self, buyer_id: &UserId) -> Result<Vec<Enrollment>, DomainError> {
        let rows: Vec<(Uuid, DateTime<Utc>)> = sqlx::query_as(
            "SELECT course_id, enrolled_at FROM user_enrolled_courses WHERE user_id = $1 ORDER BY enrolled_at",
        )
        .bind(buyer_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to list enrollments: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|(course_id, enrolled_at)| Enrollment {
                course_id: CourseId::from_uuid(course_id),
                enrolled_at: Timestamp::from_datetime(enrolled_at),
            })
            .collect())
    }
}

/// Per-course student rosters.
pub struct PostgresCourseRoster {
    pool: PgPool,
}

impl PostgresCourseRoster {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CourseRoster for PostgresCourseRoster {
    async fn add_student(&self, course_id: &CourseId, buyer_id: &UserId) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO course_enrolled_students (course_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (course_id, user_id) DO NOTHING
            "#,
        )
        .bind(course_id.as_uuid())
        .bind(buyer_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to add student: {}", e)))?;
        Ok(())
    }

    async fn remove_student(
        &self,
        course_id: &CourseId,
        buyer_id: &UserId,
    ) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM course_enrolled_students WHERE course_id = $1 AND user_id = $2")
            .bind(course_id.as_uuid())
            .bind(buyer_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to remove student: {}", e)))?;
        Ok(())
    }

    async fn has_student(&self, course_id: &CourseId, buyer_id: &UserId) -> Result<bool, DomainError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM course_enrolled_students WHERE course_id = $1 AND user_id = $2)",
        )
        .bind(course_id.as_uuid())
        .bind(buyer_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to check roster: {}", e)))?;
        Ok(exists)
    }
}
