//! Purchase handlers.
//!
//! Command and query handlers for the payment-to-enrollment flow:
//!
//! ## Commands
//! - Initiating a checkout against the configured gateway
//! - Reconciling verified payment confirmations (webhook or client relay)
//! - Refunding a completed purchase
//!
//! ## Queries
//! - Purchase status for one course
//! - Purchased-course listing
//!
//! ## Support
//! - `EnrollmentFanout` keeps the enrollment views in step with the ledger
//! - `retry` holds the backoff and timeout helpers for gateway calls

mod fanout;
mod get_purchase_status;
mod handle_gateway_webhook;
mod initiate_checkout;
mod list_purchased_courses;
mod reconcile_payment;
mod refund_purchase;
mod retry;
mod verify_client_payment;

// Commands
pub use handle_gateway_webhook::{
    HandleGatewayWebhookCommand, HandleGatewayWebhookHandler, HandleGatewayWebhookResult,
};
pub use initiate_checkout::{
    InitiateCheckoutCommand, InitiateCheckoutHandler, InitiateCheckoutResult,
};
pub use reconcile_payment::{
    ConfirmationSource, PaymentFailureOutcome, ReconcilePaymentCommand, ReconcilePaymentHandler,
    ReconcilePaymentResult,
};
pub use refund_purchase::{RefundPurchaseCommand, RefundPurchaseHandler, RefundPurchaseResult};
pub use verify_client_payment::{VerifyClientPaymentCommand, VerifyClientPaymentHandler};

// Queries
pub use get_purchase_status::{
    GetPurchaseStatusHandler, GetPurchaseStatusQuery, GetPurchaseStatusResult,
};
pub use list_purchased_courses::{
    ListPurchasedCoursesHandler, ListPurchasedCoursesQuery, PurchasedCourse,
};

// Support
pub use fanout::{EnrollmentFanout, FanoutDirection, FanoutOutcome};
pub use retry::{retry_with_backoff, with_timeout, RetryPolicy};
