//! Razorpay payment gateway adapter.

mod gateway;
mod types;

pub use gateway::{RazorpayConfig, RazorpayGateway};
pub use types::{RazorpayOrder, RazorpayPayment, RazorpayRefund, RazorpayWebhook};
