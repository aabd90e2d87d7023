//! Course Enrollment - payment-to-enrollment reconciliation
//!
//! Turns authenticated payment-gateway confirmations into durable course
//! enrollments. A purchase ledger is the source of truth; the buyer's
//! enrolled-course set and the course roster are views kept in step with it.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
