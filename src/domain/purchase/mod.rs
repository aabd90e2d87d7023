//! Purchase module - the payment-to-enrollment ledger.
//!
//! A purchase records one buyer's attempt to acquire one course and moves
//! through `pending → completed → refunded` (or `pending → failed`) as
//! authenticated gateway confirmations arrive.

mod aggregate;
mod errors;
mod gateway_event;
mod refund_policy;
mod signature;
mod status;
mod webhook_errors;

pub use aggregate::{CompletionOutcome, Purchase, RefundRecord};
pub use errors::{ErrorCategory, PurchaseError, VerificationKind};
pub use gateway_event::{GatewayEvent, GatewayKind, PaymentConfirmation};
pub use refund_policy::RefundPolicy;
pub use signature::{
    hmac_sha256, hmac_sha256_hex, ClientSignatureVerifier, RazorpaySignatureVerifier,
    SignatureHeader, StripeSignatureVerifier,
};
pub use status::PurchaseStatus;
pub use webhook_errors::WebhookError;
