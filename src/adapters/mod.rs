//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `postgres` - Ledger, catalog and enrollment views in PostgreSQL
//! - `memory` - In-memory stores for tests and local runs
//! - `stripe` / `razorpay` / `mock` - Payment gateways
//! - `alerts` - Operator inconsistency reporting
//! - `http` - Axum REST surface
//! - `workers` - Background reconciliation sweep

pub mod alerts;
mod gateway_http;
pub mod http;
pub mod memory;
pub mod mock;
pub mod postgres;
pub mod razorpay;
pub mod stripe;
pub mod workers;

pub use alerts::{RecordingInconsistencyReporter, TracingInconsistencyReporter};
pub use memory::{
    InMemoryBuyerDirectory, InMemoryCourseCatalog, InMemoryCourseRoster,
    InMemoryPurchaseRepository,
};
pub use mock::{MockMethod, MockPaymentGateway};
pub use postgres::{
    PostgresBuyerDirectory, PostgresCourseCatalog, PostgresCourseRoster,
    PostgresPurchaseRepository,
};
pub use razorpay::{RazorpayConfig, RazorpayGateway};
pub use stripe::{StripeConfig, StripeGateway};
pub use workers::{ReconciliationSweep, ReconciliationSweepConfig, SweepReport};
