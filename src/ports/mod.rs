//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Ledger
//!
//! - `PurchaseRepository` - Purchase persistence with compare-and-swap writes
//!
//! ## Collaborators
//!
//! - `CourseCatalog` - Course title and current price
//! - `BuyerDirectory` - Buyer existence and enrolled-course set
//! - `CourseRoster` - Course enrolled-student set
//! - `PaymentGateway` - Orders, webhooks, payment lookups, refunds
//! - `InconsistencyReporter` - Operator alerts

mod buyer_directory;
mod course_catalog;
mod course_roster;
mod inconsistency_reporter;
mod payment_gateway;
mod purchase_repository;

pub use buyer_directory::{BuyerDirectory, Enrollment};
pub use course_catalog::{CourseCatalog, CourseListing};
pub use course_roster::CourseRoster;
pub use inconsistency_reporter::{InconsistencyKind, InconsistencyReport, InconsistencyReporter};
pub use payment_gateway::{
    CheckoutArtifact, CreateOrderRequest, GatewayError, GatewayErrorCode, GatewayOrder,
    PaymentDetails, PaymentGateway, RefundReceipt, RefundRequest, RefundStatus,
};
pub use purchase_repository::PurchaseRepository;
