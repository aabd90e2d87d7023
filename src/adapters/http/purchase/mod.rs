//! HTTP adapter for purchase endpoints.
//!
//! - `POST /checkout` - Open a purchase and gateway order
//! - `POST /webhook` - Gateway notifications (raw body, signature header)
//! - `POST /verify-payment` - Client-relayed confirmation
//! - `POST /refund` - Refund a completed purchase
//! - `GET /purchase-status/:courseId` - Buyer's purchase state for a course
//! - `GET /purchased-courses` - Buyer's completed purchases

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{
    AuthenticatedUser, PurchaseApiError, PurchaseAppState, PurchaseSettings, USER_ID_HEADER,
};
pub use routes::purchase_router;
