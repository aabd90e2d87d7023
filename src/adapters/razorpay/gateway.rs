//! Razorpay order/signature gateway.
//!
//! Orders are created server-side and handed to the in-browser checkout
//! widget. Completion arrives two ways: the browser relays
//! `order|payment` signed with the key secret, and Razorpay posts
//! `payment.captured` / `order.paid` webhooks signed with the webhook
//! secret. Both land in the same reconciliation path.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::adapters::gateway_http::{read_json, transport_error};
use crate::domain::purchase::{
    ClientSignatureVerifier, GatewayEvent, GatewayKind, PaymentConfirmation,
    RazorpaySignatureVerifier, WebhookError,
};
use crate::ports::{
    CheckoutArtifact, CreateOrderRequest, GatewayError, GatewayOrder, PaymentDetails,
    PaymentGateway, RefundReceipt, RefundRequest,
};

use super::types::{
    RazorpayOrder, RazorpayOrderRequest, RazorpayPayment, RazorpayRefund, RazorpayRefundRequest,
    RazorpayWebhook,
};

const PROVIDER: &str = "razorpay";

/// Receipts are capped at 40 characters by Razorpay.
const MAX_RECEIPT_LEN: usize = 40;

/// Razorpay API configuration.
#[derive(Clone)]
pub struct RazorpayConfig {
    /// Public key id (rzp_live_... or rzp_test_...), also sent to the browser.
    key_id: String,

    key_secret: SecretString,

    webhook_secret: SecretString,

    api_base_url: String,
}

impl RazorpayConfig {
    pub fn new(
        key_id: impl Into<String>,
        key_secret: SecretString,
        webhook_secret: SecretString,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            key_secret,
            webhook_secret,
            api_base_url: "https://api.razorpay.com".to_string(),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

/// Razorpay implementation of [`PaymentGateway`].
pub struct RazorpayGateway {
    config: RazorpayConfig,
    webhook_verifier: RazorpaySignatureVerifier,
    client_verifier: ClientSignatureVerifier,
    http_client: reqwest::Client,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig) -> Self {
        let webhook_verifier =
            RazorpaySignatureVerifier::new(config.webhook_secret.expose_secret().clone());
        let client_verifier = ClientSignatureVerifier::new(config.key_secret.expose_secret().clone());
        Self {
            config,
            webhook_verifier,
            client_verifier,
            http_client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.basic_auth(
            &self.config.key_id,
            Some(self.config.key_secret.expose_secret()),
        )
    }

    fn order_body(request: &CreateOrderRequest) -> RazorpayOrderRequest {
        let mut receipt = format!("course_{}", request.course_id.as_uuid().simple());
        receipt.truncate(MAX_RECEIPT_LEN);
        RazorpayOrderRequest {
            amount: request.amount.minor_units,
            currency: request.amount.currency.to_string(),
            receipt,
            notes: HashMap::from([
                ("user", request.buyer_id.to_string()),
                ("course", request.course_id.to_string()),
                ("purchase", request.purchase_id.to_string()),
            ]),
        }
    }

    fn parse_event(payload: &[u8]) -> Result<GatewayEvent, WebhookError> {
        let webhook: RazorpayWebhook = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;

        let payment = webhook.payload.payment.map(|p| p.entity);
        // Razorpay has no event id in the body; event + payment id is stable
        // across redeliveries.
        let event_id = format!(
            "{}:{}",
            webhook.event,
            payment.as_ref().map(|p| p.id.as_str()).unwrap_or("-")
        );

        match webhook.event.as_str() {
            "payment.captured" | "order.paid" => {
                let payment = payment.ok_or(WebhookError::MissingField("payload.payment"))?;
                let order_ref = payment
                    .order_id
                    .ok_or(WebhookError::MissingField("payment.order_id"))?;
                let mut confirmation = PaymentConfirmation::new(order_ref, payment.id);
                confirmation.payment_method = payment.method;
                confirmation.settled_amount = payment.amount;
                Ok(GatewayEvent::PaymentCaptured {
                    event_id,
                    confirmation,
                })
            }
            "payment.failed" => {
                let payment = payment.ok_or(WebhookError::MissingField("payload.payment"))?;
                Ok(GatewayEvent::PaymentFailed {
                    event_id,
                    order_ref: payment
                        .order_id
                        .ok_or(WebhookError::MissingField("payment.order_id"))?,
                    reason: payment
                        .error_description
                        .unwrap_or_else(|| "payment failed".to_string()),
                })
            }
            _ => Ok(GatewayEvent::Ignored {
                event_id,
                event_type: webhook.event,
            }),
        }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Razorpay
    }

    fn signature_header(&self) -> &'static str {
        "x-razorpay-signature"
    }

    async fn create_order(&self, request: CreateOrderRequest) -> Result<GatewayOrder, GatewayError> {
        let response = self
            .authed(self.http_client.post(self.url("/v1/orders")))
            .json(&Self::order_body(&request))
            .send()
            .await
            .map_err(transport_error)?;

        let order: RazorpayOrder = read_json(PROVIDER, "create_order", response).await?;

        Ok(GatewayOrder {
            checkout: CheckoutArtifact::Order {
                order_id: order.id.clone(),
                amount: order.amount,
                currency: order.currency.clone(),
                key_id: self.config.key_id.clone(),
            },
            order_ref: order.id,
            amount: order.amount,
            currency: order.currency,
        })
    }

    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<GatewayEvent, WebhookError> {
        self.webhook_verifier.verify(payload, signature)?;
        Self::parse_event(payload)
    }

    async fn verify_client_signature(
        &self,
        order_ref: &str,
        payment_ref: &str,
        signature: &str,
    ) -> Result<bool, GatewayError> {
        Ok(self.client_verifier.verify(order_ref, payment_ref, signature))
    }

    async fn fetch_payment(&self, payment_ref: &str) -> Result<PaymentDetails, GatewayError> {
        let response = self
            .authed(
                self.http_client
                    .get(self.url(&format!("/v1/payments/{}", payment_ref))),
            )
            .send()
            .await
            .map_err(transport_error)?;

        let payment: RazorpayPayment = read_json(PROVIDER, "fetch_payment", response).await?;

        Ok(PaymentDetails {
            settled_amount: if payment.is_captured() {
                payment.amount
            } else {
                None
            },
            payment_ref: payment.id,
            order_ref: payment.order_id,
            method: payment.method,
        })
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundReceipt, GatewayError> {
        let body = RazorpayRefundRequest {
            amount: request.amount.minor_units,
            notes: HashMap::from([
                ("reason", request.reason.clone()),
                ("purchase", request.purchase_id.to_string()),
            ]),
        };

        let response = self
            .authed(
                self.http_client
                    .post(self.url(&format!("/v1/payments/{}/refund", request.payment_ref))),
            )
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let refund: RazorpayRefund = read_json(PROVIDER, "refund", response).await?;

        Ok(RefundReceipt {
            status: refund.refund_status(),
            refund_ref: refund.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{CourseId, Currency, Money, PurchaseId, UserId};

    const KEY_SECRET: &str = "rzp_key_secret";
    const WEBHOOK_SECRET: &str = "rzp_webhook_secret";

    fn gateway() -> RazorpayGateway {
        RazorpayGateway::new(RazorpayConfig::new(
            "rzp_test_key",
            SecretString::new(KEY_SECRET.to_string()),
            SecretString::new(WEBHOOK_SECRET.to_string()),
        ))
    }

    fn payment_event(event: &str) -> String {
        format!(
            r#"{{
                "event": "{}",
                "payload": {{"payment": {{"entity": {{
                    "id": "pay_1",
                    "order_id": "order_1",
                    "amount": 199900,
                    "currency": "INR",
                    "status": "captured",
                    "method": "card",
                    "error_description": "Card declined"
                }}}}}}
            }}"#,
            event
        )
    }

    #[test]
    fn receipt_fits_provider_limit() {
        let request = CreateOrderRequest {
            purchase_id: PurchaseId::new(),
            buyer_id: UserId::new("buyer-1").unwrap(),
            course_id: CourseId::new(),
            course_title: "Course".to_string(),
            amount: Money::from_minor(199_900, Currency::inr()).unwrap(),
        };

        let body = RazorpayGateway::order_body(&request);

        assert!(body.receipt.starts_with("course_"));
        assert!(body.receipt.len() <= MAX_RECEIPT_LEN);
        assert_eq!(body.amount, 199_900);
        assert_eq!(body.currency, "INR");
        assert_eq!(body.notes["user"], "buyer-1");
    }

    #[tokio::test]
    async fn captured_and_order_paid_are_captures() {
        let gw = gateway();
        let signer = RazorpaySignatureVerifier::new(WEBHOOK_SECRET);

        for event in ["payment.captured", "order.paid"] {
            let payload = payment_event(event);
            let parsed = gw
                .verify_webhook(payload.as_bytes(), &signer.sign(payload.as_bytes()))
                .await
                .unwrap();

            match parsed {
                GatewayEvent::PaymentCaptured { confirmation, .. } => {
                    assert_eq!(confirmation.order_ref, "order_1");
                    assert_eq!(confirmation.payment_ref, "pay_1");
                    assert_eq!(confirmation.payment_method.as_deref(), Some("card"));
                    assert_eq!(confirmation.settled_amount, Some(199_900));
                }
                other => panic!("expected capture for {}, got {:?}", event, other),
            }
        }
    }

    #[tokio::test]
    async fn payment_failed_carries_reason() {
        let gw = gateway();
        let payload = payment_event("payment.failed");
        let signature = RazorpaySignatureVerifier::new(WEBHOOK_SECRET).sign(payload.as_bytes());

        let parsed = gw
            .verify_webhook(payload.as_bytes(), &signature)
            .await
            .unwrap();

        assert_eq!(
            parsed,
            GatewayEvent::PaymentFailed {
                event_id: "payment.failed:pay_1".to_string(),
                order_ref: "order_1".to_string(),
                reason: "Card declined".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn webhook_signed_with_key_secret_is_rejected() {
        let gw = gateway();
        let payload = payment_event("payment.captured");
        let wrong = RazorpaySignatureVerifier::new(KEY_SECRET).sign(payload.as_bytes());

        let err = gw
            .verify_webhook(payload.as_bytes(), &wrong)
            .await
            .unwrap_err();

        assert_eq!(err, WebhookError::InvalidSignature);
    }

    #[tokio::test]
    async fn client_signature_uses_key_secret() {
        let gw = gateway();
        let signature = ClientSignatureVerifier::new(KEY_SECRET).sign("order_1", "pay_1");

        assert!(gw
            .verify_client_signature("order_1", "pay_1", &signature)
            .await
            .unwrap());
        assert!(!gw
            .verify_client_signature("order_1", "pay_2", &signature)
            .await
            .unwrap());
    }
}
