//! Stripe API objects as they arrive in responses and webhook payloads.
//!
//! Only the fields reconciliation reads are modelled; everything else is
//! ignored by serde.

use std::collections::HashMap;

use serde::Deserialize;

use crate::ports::RefundStatus;

/// Webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    pub data: StripeEventData,

    #[serde(default)]
    pub livemode: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// Checkout session, from `POST /v1/checkout/sessions` and webhook events.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,

    /// Hosted payment page. Absent once the session is complete.
    pub url: Option<String>,

    pub amount_total: Option<i64>,

    pub currency: Option<String>,

    /// `paid`, `unpaid` or `no_payment_required`.
    pub payment_status: Option<String>,

    pub payment_intent: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl StripeCheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }
}

/// Payment intent, from `GET /v1/payment_intents/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,

    pub amount_received: Option<i64>,

    #[serde(default)]
    pub payment_method_types: Vec<String>,

    pub status: Option<String>,
}

/// Refund, from `POST /v1/refunds`.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeRefund {
    pub id: String,
    pub status: String,
}

impl StripeRefund {
    pub fn refund_status(&self) -> RefundStatus {
        match self.status.as_str() {
            "succeeded" => RefundStatus::Processed,
            "failed" | "canceled" => RefundStatus::Failed,
            _ => RefundStatus::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_parses_with_unknown_fields() {
        let json = r#"{
            "id": "cs_test_1",
            "object": "checkout.session",
            "url": "https://checkout.stripe.com/c/pay/cs_test_1",
            "amount_total": 199900,
            "currency": "inr",
            "payment_status": "unpaid",
            "payment_intent": null,
            "metadata": {"courseId": "c1"}
        }"#;

        let session: StripeCheckoutSession = serde_json::from_str(json).unwrap();

        assert_eq!(session.amount_total, Some(199_900));
        assert!(!session.is_paid());
        assert_eq!(session.metadata.get("courseId").map(String::as_str), Some("c1"));
    }

    #[test]
    fn refund_statuses_map() {
        let refund = |status: &str| StripeRefund {
            id: "re_1".into(),
            status: status.into(),
        };
        assert_eq!(refund("succeeded").refund_status(), RefundStatus::Processed);
        assert_eq!(refund("pending").refund_status(), RefundStatus::Pending);
        assert_eq!(refund("requires_action").refund_status(), RefundStatus::Pending);
        assert_eq!(refund("canceled").refund_status(), RefundStatus::Failed);
    }
}
