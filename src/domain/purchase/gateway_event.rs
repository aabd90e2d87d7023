//! Provider-agnostic payment events.
//!
//! Gateway adapters translate their own webhook shapes into these types so
//! the reconciliation core never sees provider-specific fields.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which payment gateway a purchase was opened against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayKind {
    /// Hosted checkout with webhook-confirmed completion.
    Stripe,
    /// Order/signature flow with client-relayed confirmation.
    Razorpay,
    /// In-process test double.
    Mock,
}

impl GatewayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayKind::Stripe => "stripe",
            GatewayKind::Razorpay => "razorpay",
            GatewayKind::Mock => "mock",
        }
    }
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for GatewayKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stripe" => Ok(GatewayKind::Stripe),
            "razorpay" => Ok(GatewayKind::Razorpay),
            "mock" => Ok(GatewayKind::Mock),
            other => Err(format!("unknown gateway '{}'", other)),
        }
    }
}

/// Authenticated evidence that money moved for a gateway order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    /// Gateway order reference the payment settles.
    pub order_ref: String,

    /// Gateway payment reference.
    pub payment_ref: String,

    /// Free-form payment method reported by the gateway.
    pub payment_method: Option<String>,

    /// Settled amount in minor units, when the gateway reports one.
    pub settled_amount: Option<i64>,
}

impl PaymentConfirmation {
    pub fn new(order_ref: impl Into<String>, payment_ref: impl Into<String>) -> Self {
        Self {
            order_ref: order_ref.into(),
            payment_ref: payment_ref.into(),
            payment_method: None,
            settled_amount: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = Some(method.into());
        self
    }

    pub fn with_settled_amount(mut self, minor_units: i64) -> Self {
        self.settled_amount = Some(minor_units);
        self
    }
}

/// A verified webhook, reduced to what reconciliation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// Payment captured for an order.
    PaymentCaptured {
        event_id: String,
        confirmation: PaymentConfirmation,
    },

    /// Gateway reports the order will not be paid.
    PaymentFailed {
        event_id: String,
        order_ref: String,
        reason: String,
    },

    /// Authentic event this service does not act on.
    Ignored { event_id: String, event_type: String },
}

impl GatewayEvent {
    pub fn event_id(&self) -> &str {
        match self {
            GatewayEvent::PaymentCaptured { event_id, .. }
            | GatewayEvent::PaymentFailed { event_id, .. }
            | GatewayEvent::Ignored { event_id, .. } => event_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_kind_parses_case_insensitively() {
        assert_eq!("Stripe".parse::<GatewayKind>(), Ok(GatewayKind::Stripe));
        assert_eq!("RAZORPAY".parse::<GatewayKind>(), Ok(GatewayKind::Razorpay));
        assert!("paypal".parse::<GatewayKind>().is_err());
    }

    #[test]
    fn confirmation_builder_sets_optional_fields() {
        let confirmation = PaymentConfirmation::new("order_1", "pay_1")
            .with_method("card")
            .with_settled_amount(99_900);

        assert_eq!(confirmation.payment_method.as_deref(), Some("card"));
        assert_eq!(confirmation.settled_amount, Some(99_900));
    }

    #[test]
    fn event_id_is_exposed_for_every_variant() {
        let ignored = GatewayEvent::Ignored {
            event_id: "evt_9".into(),
            event_type: "customer.created".into(),
        };
        assert_eq!(ignored.event_id(), "evt_9");
    }
}
