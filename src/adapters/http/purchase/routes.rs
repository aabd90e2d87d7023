//! Axum router configuration for purchase endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    checkout, purchase_status, purchased_courses, refund, verify_payment, webhook,
    PurchaseAppState,
};

/// Buyer-facing routes. Every handler requires [`super::AuthenticatedUser`].
///
/// - `POST /checkout`
/// - `POST /verify-payment`
/// - `POST /refund`
/// - `GET /purchase-status/:courseId`
/// - `GET /purchased-courses`
pub fn buyer_routes() -> Router<PurchaseAppState> {
    Router::new()
        .route("/checkout", post(checkout))
        .route("/verify-payment", post(verify_payment))
        .route("/refund", post(refund))
        .route("/purchase-status/:course_id", get(purchase_status))
        .route("/purchased-courses", get(purchased_courses))
}

/// Gateway-facing route. Authenticated by signature, not by buyer identity.
pub fn webhook_routes() -> Router<PurchaseAppState> {
    Router::new().route("/webhook", post(webhook))
}

/// All purchase routes.
pub fn purchase_router() -> Router<PurchaseAppState> {
    buyer_routes().merge(webhook_routes())
}
