//! Course catalog port.
//!
//! The catalog is owned elsewhere; this service only reads a course's
//! title and current price when opening a purchase.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{CourseId, DomainError, Money};

/// What the purchase flow needs to know about a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseListing {
    pub id: CourseId,
    pub title: String,
    pub description: Option<String>,
    /// Current price in minor units.
    pub price: Money,
}

#[async_trait]
pub trait CourseCatalog: Send + Sync {
    /// Returns the course, or `None` if it does not exist.
    async fn get_course(&self, id: &CourseId) -> Result<Option<CourseListing>, DomainError>;
}
