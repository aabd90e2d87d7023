//! HTTP adapters - REST API implementations.

pub mod app;
pub mod purchase;

pub use app::{build_router, HttpSettings};
pub use purchase::{purchase_router, PurchaseAppState, PurchaseSettings};
