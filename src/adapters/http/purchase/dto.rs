//! HTTP DTOs for purchase endpoints.
//!
//! JSON is camelCase on the wire. The verify-payment request also accepts
//! the field names the Razorpay checkout widget hands back to the browser.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::handlers::purchase::{
    GetPurchaseStatusResult, HandleGatewayWebhookResult, InitiateCheckoutResult, PurchasedCourse,
    ReconcilePaymentResult, RefundPurchaseResult,
};
use crate::domain::foundation::Timestamp;
use crate::domain::purchase::{CompletionOutcome, Purchase, PurchaseStatus};
use crate::ports::{CheckoutArtifact, CourseListing};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub course_id: Uuid,
}

/// Client-relayed payment confirmation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    #[serde(alias = "razorpay_order_id")]
    pub order_id: String,
    #[serde(alias = "razorpay_payment_id")]
    pub payment_id: String,
    #[serde(alias = "razorpay_signature")]
    pub signature: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequestBody {
    pub purchase_id: Uuid,
    pub refund_reason: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub purchase_id: String,
    pub status: PurchaseStatus,
    /// Amount in minor units.
    pub amount: i64,
    pub currency: String,
    pub checkout: CheckoutArtifact,
}

impl From<InitiateCheckoutResult> for CheckoutResponse {
    fn from(result: InitiateCheckoutResult) -> Self {
        Self {
            purchase_id: result.purchase.id.to_string(),
            status: result.purchase.status,
            amount: result.purchase.amount.minor_units,
            currency: result.purchase.amount.currency.to_string(),
            checkout: result.checkout,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub purchase_id: String,
    pub status: PurchaseStatus,
    pub course_id: String,
    /// True when an earlier confirmation had already completed the purchase.
    pub already_applied: bool,
}

impl From<ReconcilePaymentResult> for VerifyPaymentResponse {
    fn from(result: ReconcilePaymentResult) -> Self {
        Self {
            purchase_id: result.purchase.id.to_string(),
            status: result.purchase.status,
            course_id: result.purchase.course_id.to_string(),
            already_applied: result.outcome == CompletionOutcome::AlreadyApplied,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponse {
    pub purchase_id: String,
    pub status: PurchaseStatus,
    pub refund_id: String,
    pub refund_amount: i64,
    pub currency: String,
    pub refunded_at: String,
}

impl From<RefundPurchaseResult> for RefundResponse {
    fn from(result: RefundPurchaseResult) -> Self {
        Self {
            purchase_id: result.purchase.id.to_string(),
            status: result.purchase.status,
            refund_id: result.refund.refund_ref,
            refund_amount: result.refund.amount.minor_units,
            currency: result.refund.amount.currency.to_string(),
            refunded_at: rfc3339(result.refund.refunded_at),
        }
    }
}

/// Course summary embedded in read responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub price: i64,
    pub currency: String,
}

impl From<&CourseListing> for CourseSummary {
    fn from(course: &CourseListing) -> Self {
        Self {
            id: course.id.to_string(),
            title: course.title.clone(),
            description: course.description.clone(),
            price: course.price.minor_units,
            currency: course.price.currency.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseStatusResponse {
    pub course: CourseSummary,
    pub purchased: bool,
    pub status: Option<PurchaseStatus>,
    pub purchase_id: Option<String>,
    pub enrolled: bool,
}

impl From<GetPurchaseStatusResult> for PurchaseStatusResponse {
    fn from(result: GetPurchaseStatusResult) -> Self {
        let purchased = result.purchased();
        Self {
            course: CourseSummary::from(&result.course),
            purchased,
            status: result.purchase.as_ref().map(|p| p.status),
            purchase_id: result.purchase.as_ref().map(|p| p.id.to_string()),
            enrolled: result.enrolled,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasedCourseResponse {
    pub course: CourseSummary,
    pub purchase_id: String,
    pub amount_paid: i64,
    pub currency: String,
    pub payment_method: Option<String>,
    pub completed_at: Option<String>,
    pub enrolled_at: Option<String>,
}

impl From<PurchasedCourse> for PurchasedCourseResponse {
    fn from(entry: PurchasedCourse) -> Self {
        let Purchase {
            id,
            amount,
            payment_method,
            completed_at,
            ..
        } = entry.purchase;
        Self {
            course: CourseSummary::from(&entry.course),
            purchase_id: id.to_string(),
            amount_paid: amount.minor_units,
            currency: amount.currency.to_string(),
            payment_method,
            completed_at: completed_at.map(rfc3339),
            enrolled_at: entry.enrolled_at.map(rfc3339),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasedCoursesResponse {
    pub courses: Vec<PurchasedCourseResponse>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_id: Option<String>,
}

impl From<HandleGatewayWebhookResult> for WebhookAck {
    fn from(result: HandleGatewayWebhookResult) -> Self {
        let (outcome, purchase_id) = match result {
            HandleGatewayWebhookResult::PurchaseCompleted { purchase_id } => {
                ("completed", Some(purchase_id))
            }
            HandleGatewayWebhookResult::AlreadyCompleted { purchase_id } => {
                ("already_completed", Some(purchase_id))
            }
            HandleGatewayWebhookResult::PurchaseFailed { purchase_id } => {
                ("failed", Some(purchase_id))
            }
            HandleGatewayWebhookResult::Ignored { .. } => ("ignored", None),
        };
        Self {
            received: true,
            outcome,
            purchase_id: purchase_id.map(|id| id.to_string()),
        }
    }
}

/// Error body shared by every endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}

fn rfc3339(ts: Timestamp) -> String {
    ts.as_datetime().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn verify_payment_accepts_camel_case() {
        let req: VerifyPaymentRequest = serde_json::from_value(json!({
            "orderId": "order_1",
            "paymentId": "pay_1",
            "signature": "abc"
        }))
        .unwrap();
        assert_eq!(req.order_id, "order_1");
        assert_eq!(req.payment_id, "pay_1");
    }

    #[test]
    fn verify_payment_accepts_razorpay_widget_fields() {
        let req: VerifyPaymentRequest = serde_json::from_value(json!({
            "razorpay_order_id": "order_1",
            "razorpay_payment_id": "pay_1",
            "razorpay_signature": "abc"
        }))
        .unwrap();
        assert_eq!(req.order_id, "order_1");
        assert_eq!(req.signature, "abc");
    }

    #[test]
    fn refund_request_requires_reason() {
        let result: Result<RefundRequestBody, _> = serde_json::from_value(json!({
            "purchaseId": Uuid::new_v4()
        }));
        assert!(result.is_err());
    }

    #[test]
    fn error_response_serializes_camel_case() {
        let body = serde_json::to_value(ErrorResponse::new("PURCHASE_NOT_FOUND", "Purchase not found"))
            .unwrap();
        assert_eq!(body, json!({"errorCode": "PURCHASE_NOT_FOUND", "message": "Purchase not found"}));
    }

    #[test]
    fn ignored_webhook_ack_omits_purchase_id() {
        let ack = WebhookAck::from(HandleGatewayWebhookResult::Ignored {
            event_type: "charge.updated".to_string(),
        });
        let body = serde_json::to_value(ack).unwrap();
        assert_eq!(body, json!({"received": true, "outcome": "ignored"}));
    }
}
