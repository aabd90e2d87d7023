//! PostgreSQL adapters - Database implementations for the repository ports.
//!
//! - `PostgresPurchaseRepository` - the purchase ledger, with status CAS
//! - `PostgresCourseCatalog` - course prices and titles
//! - `PostgresBuyerDirectory` / `PostgresCourseRoster` - enrollment views

mod course_catalog;
mod enrollment_views;
mod purchase_repository;

pub use course_catalog::PostgresCourseCatalog;
pub use enrollment_views::{PostgresBuyerDirectory, PostgresCourseRoster};
pub use purchase_repository::PostgresPurchaseRepository;
