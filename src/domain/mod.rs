//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, money, errors)
//! - `purchase` - Purchase ledger, status state machine, signature verification

pub mod foundation;
pub mod purchase;
