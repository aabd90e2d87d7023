//! In-memory adapters for tests and local development.

mod course_catalog;
mod enrollment_views;
mod purchase_repository;

pub use course_catalog::InMemoryCourseCatalog;
pub use enrollment_views::{InMemoryBuyerDirectory, InMemoryCourseRoster};
pub use purchase_repository::InMemoryPurchaseRepository;
