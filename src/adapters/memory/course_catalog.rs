//! In-memory course catalog.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{CourseId, DomainError};
use crate::ports::{CourseCatalog, CourseListing};

#[derive(Default)]
pub struct InMemoryCourseCatalog {
    courses: RwLock<HashMap<CourseId, CourseListing>>,
}

impl InMemoryCourseCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a listing.
    pub async fn add_course(&self, listing: CourseListing) {
        self.courses.write().await.insert(listing.id, listing);
    }
}

#[async_trait]
impl CourseCatalog for InMemoryCourseCatalog {
    async fn get_course(&self, id: &CourseId) -> Result<Option<CourseListing>, DomainError> {
        Ok(self.courses.read().await.get(id).cloned())
    }
}
