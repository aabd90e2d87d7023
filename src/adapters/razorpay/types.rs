//! Razorpay API objects and webhook payloads.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ports::RefundStatus;

/// Body for `POST /v1/orders`.
#[derive(Debug, Clone, Serialize)]
pub struct RazorpayOrderRequest {
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: HashMap<&'static str, String>,
}

/// Order, from `POST /v1/orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: Option<String>,
}

/// Payment entity, from `GET /v1/payments/{id}` and webhook payloads.
#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayPayment {
    pub id: String,
    pub order_id: Option<String>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    /// `created`, `authorized`, `captured`, `refunded` or `failed`.
    pub status: Option<String>,
    pub method: Option<String>,
    pub error_description: Option<String>,
}

impl RazorpayPayment {
    pub fn is_captured(&self) -> bool {
        self.status.as_deref() == Some("captured")
    }
}

/// Body for `POST /v1/payments/{id}/refund`.
#[derive(Debug, Clone, Serialize)]
pub struct RazorpayRefundRequest {
    pub amount: i64,
    pub notes: HashMap<&'static str, String>,
}

/// Refund, from `POST /v1/payments/{id}/refund`.
#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayRefund {
    pub id: String,
    pub status: String,
}

impl RazorpayRefund {
    pub fn refund_status(&self) -> RefundStatus {
        match self.status.as_str() {
            "processed" => RefundStatus::Processed,
            "failed" => RefundStatus::Failed,
            _ => RefundStatus::Pending,
        }
    }
}

/// Webhook envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayWebhook {
    pub event: String,
    #[serde(default)]
    pub payload: RazorpayWebhookPayload,
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RazorpayWebhookPayload {
    pub payment: Option<RazorpayEntity<RazorpayPayment>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayEntity<T> {
    pub entity: T,
}
