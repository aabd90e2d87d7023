//! Stripe payment gateway adapter.
//!
//! - `gateway` - [`StripeGateway`], the hosted-checkout `PaymentGateway`
//! - `types` - Stripe API and webhook payload shapes

mod gateway;
mod types;

pub use gateway::{StripeConfig, StripeGateway};
pub use types::{StripeCheckoutSession, StripeEvent, StripePaymentIntent, StripeRefund};
