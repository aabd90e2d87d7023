//! Mock payment gateway for testing.
//!
//! Provides a configurable implementation of `PaymentGateway` for unit and
//! integration tests. Supports:
//! - Real HMAC signing of webhooks and client relays (so forged input is
//!   rejected exactly as a real gateway adapter would)
//! - Error injection per method
//! - Amount echo override and artificial latency
//! - Call tracking
//!
//! Webhook bodies are JSON:
//! `{"id", "type", "orderRef", "paymentRef", "method", "amount", "reason"}`
//! with `type` one of `payment.captured`, `payment.failed`, or anything else
//! (ignored). The signature is hex HMAC-SHA256 of the raw body.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::purchase::{
    ClientSignatureVerifier, GatewayEvent, GatewayKind, PaymentConfirmation,
    RazorpaySignatureVerifier, WebhookError,
};
use crate::ports::{
    CheckoutArtifact, CreateOrderRequest, GatewayError, GatewayOrder, PaymentDetails,
    PaymentGateway, RefundReceipt, RefundRequest, RefundStatus,
};

const WEBHOOK_SECRET: &str = "mock_webhook_secret";
const KEY_SECRET: &str = "mock_key_secret";
const KEY_ID: &str = "mock_key_id";

/// Gateway operations, for error injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockMethod {
    CreateOrder,
    VerifyWebhook,
    VerifyClientSignature,
    FetchPayment,
    Refund,
}

/// Mock payment gateway.
///
/// # Panics
///
/// Methods panic if the internal lock is poisoned. This adapter is for
/// tests and local development only.
#[derive(Clone)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<MockState>>,
    webhook_verifier: RazorpaySignatureVerifier,
    client_verifier: ClientSignatureVerifier,
}

struct MockState {
    next_order: u64,
    next_refund: u64,
    echo_amount: Option<i64>,
    delay: Option<Duration>,
    refund_status: RefundStatus,
    payments: HashMap<String, PaymentDetails>,
    method_errors: HashMap<MockMethod, GatewayError>,
    calls: Vec<MockMethod>,
    order_requests: Vec<CreateOrderRequest>,
    refund_requests: Vec<RefundRequest>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            next_order: 1,
            next_refund: 1,
            echo_amount: None,
            delay: None,
            refund_status: RefundStatus::Processed,
            payments: HashMap::new(),
            method_errors: HashMap::new(),
            calls: Vec::new(),
            order_requests: Vec::new(),
            refund_requests: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MockWebhookBody {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    order_ref: Option<String>,
    payment_ref: Option<String>,
    method: Option<String>,
    amount: Option<i64>,
    reason: Option<String>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockState::default())),
            webhook_verifier: RazorpaySignatureVerifier::new(WEBHOOK_SECRET),
            client_verifier: ClientSignatureVerifier::new(KEY_SECRET),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner
            .lock()
            .expect("MockPaymentGateway: state lock poisoned")
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration
    // ════════════════════════════════════════════════════════════════════════════

    /// Makes `create_order` echo this amount instead of the requested one.
    pub fn set_echo_amount(&self, amount: Option<i64>) {
        self.state().echo_amount = amount;
    }

    /// Adds latency to every outbound call.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state().delay = delay;
    }

    pub fn set_refund_status(&self, status: RefundStatus) {
        self.state().refund_status = status;
    }

    /// Registers what `fetch_payment` returns for a payment ref.
    pub fn set_payment(&self, details: PaymentDetails) {
        self.state()
            .payments
            .insert(details.payment_ref.clone(), details);
    }

    /// Makes every call to `method` fail with `error`.
    pub fn fail_method(&self, method: MockMethod, error: GatewayError) {
        self.state().method_errors.insert(method, error);
    }

    pub fn clear_errors(&self) {
        self.state().method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Signing
    // ════════════════════════════════════════════════════════════════════════════

    /// Signature header value for a webhook body.
    pub fn sign_webhook(&self, payload: &[u8]) -> String {
        self.webhook_verifier.sign(payload)
    }

    /// Client relay signature for an order and payment.
    pub fn sign_client(&self, order_ref: &str, payment_ref: &str) -> String {
        self.client_verifier.sign(order_ref, payment_ref)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    pub fn call_count(&self, method: MockMethod) -> usize {
        self.state().calls.iter().filter(|m| **m == method).count()
    }

    pub fn order_requests(&self) -> Vec<CreateOrderRequest> {
        self.state().order_requests.clone()
    }

    pub fn refund_requests(&self) -> Vec<RefundRequest> {
        self.state().refund_requests.clone()
    }

    /// Records the call and returns the injected error and delay, if any.
    fn enter(&self, method: MockMethod) -> (Option<GatewayError>, Option<Duration>) {
        let mut state = self.state();
        state.calls.push(method);
        (state.method_errors.get(&method).cloned(), state.delay)
    }
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Mock
    }

    fn signature_header(&self) -> &'static str {
        "x-mock-signature"
    }

    async fn create_order(&self, request: CreateOrderRequest) -> Result<GatewayOrder, GatewayError> {
        let (error, delay) = self.enter(MockMethod::CreateOrder);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = error {
            return Err(error);
        }

        let mut state = self.state();
        let order_ref = format!("order_mock_{}", state.next_order);
        state.next_order += 1;
        let amount = state.echo_amount.unwrap_or(request.amount.minor_units);
        let currency = request.amount.currency.to_string();
        state.order_requests.push(request);

        Ok(GatewayOrder {
            checkout: CheckoutArtifact::Order {
                order_id: order_ref.clone(),
                amount,
                currency: currency.clone(),
                key_id: KEY_ID.to_string(),
            },
            order_ref,
            amount,
            currency,
        })
    }

    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<GatewayEvent, WebhookError> {
        self.state().calls.push(MockMethod::VerifyWebhook);
        self.webhook_verifier.verify(payload, signature)?;

        let body: MockWebhookBody = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;

        match body.event_type.as_str() {
            "payment.captured" => {
                let order_ref = body.order_ref.ok_or(WebhookError::MissingField("orderRef"))?;
                let payment_ref = body
                    .payment_ref
                    .ok_or(WebhookError::MissingField("paymentRef"))?;
                let mut confirmation = PaymentConfirmation::new(order_ref, payment_ref);
                confirmation.payment_method = body.method;
                confirmation.settled_amount = body.amount;
                Ok(GatewayEvent::PaymentCaptured {
                    event_id: body.id,
                    confirmation,
                })
            }
            "payment.failed" => Ok(GatewayEvent::PaymentFailed {
                event_id: body.id,
                order_ref: body.order_ref.ok_or(WebhookError::MissingField("orderRef"))?,
                reason: body.reason.unwrap_or_else(|| "payment failed".to_string()),
            }),
            _ => Ok(GatewayEvent::Ignored {
                event_id: body.id,
                event_type: body.event_type,
            }),
        }
    }

    async fn verify_client_signature(
        &self,
        order_ref: &str,
        payment_ref: &str,
        signature: &str,
    ) -> Result<bool, GatewayError> {
        let (error, _) = self.enter(MockMethod::VerifyClientSignature);
        if let Some(error) = error {
            return Err(error);
        }
        Ok(self.client_verifier.verify(order_ref, payment_ref, signature))
    }

    async fn fetch_payment(&self, payment_ref: &str) -> Result<PaymentDetails, GatewayError> {
        let (error, delay) = self.enter(MockMethod::FetchPayment);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = error {
            return Err(error);
        }

        Ok(self
            .state()
            .payments
            .get(payment_ref)
            .cloned()
            .unwrap_or_else(|| PaymentDetails {
                payment_ref: payment_ref.to_string(),
                order_ref: None,
                method: None,
                settled_amount: None,
            }))
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundReceipt, GatewayError> {
        let (error, delay) = self.enter(MockMethod::Refund);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = error {
            return Err(error);
        }

        let mut state = self.state();
        let refund_ref = format!("rfnd_mock_{}", state.next_refund);
        state.next_refund += 1;
        state.refund_requests.push(request);
        Ok(RefundReceipt {
            refund_ref,
            status: state.refund_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{CourseId, Currency, Money, PurchaseId, UserId};
    use serde_json::json;

    fn order_request(minor: i64) -> CreateOrderRequest {
        CreateOrderRequest {
            purchase_id: PurchaseId::new(),
            buyer_id: UserId::new("buyer-1").unwrap(),
            course_id: CourseId::new(),
            course_title: "Course".to_string(),
            amount: Money::from_minor(minor, Currency::inr()).unwrap(),
        }
    }

    #[tokio::test]
    async fn order_refs_are_unique() {
        let gateway = MockPaymentGateway::new();

        let a = gateway.create_order(order_request(100)).await.unwrap();
        let b = gateway.create_order(order_request(100)).await.unwrap();

        assert_ne!(a.order_ref, b.order_ref);
        assert_eq!(a.amount, 100);
    }

    #[tokio::test]
    async fn signed_webhook_parses_capture() {
        let gateway = MockPaymentGateway::new();
        let payload = serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": "payment.captured",
            "orderRef": "order_1",
            "paymentRef": "pay_1",
            "amount": 500
        }))
        .unwrap();

        let event = gateway
            .verify_webhook(&payload, &gateway.sign_webhook(&payload))
            .await
            .unwrap();

        match event {
            GatewayEvent::PaymentCaptured { confirmation, .. } => {
                assert_eq!(confirmation.order_ref, "order_1");
                assert_eq!(confirmation.settled_amount, Some(500));
            }
            other => panic!("expected capture, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unsigned_webhook_is_rejected() {
        let gateway = MockPaymentGateway::new();

        let err = gateway
            .verify_webhook(b"{\"id\":\"evt_1\",\"type\":\"payment.captured\"}", "deadbeef")
            .await
            .unwrap_err();

        assert!(err.is_authentication_failure());
    }

    #[tokio::test]
    async fn injected_errors_are_returned() {
        let gateway = MockPaymentGateway::new();
        gateway.fail_method(MockMethod::Refund, GatewayError::network("down"));

        let result = gateway
            .refund(RefundRequest {
                purchase_id: PurchaseId::new(),
                payment_ref: "pay_1".to_string(),
                amount: Money::from_minor(100, Currency::inr()).unwrap(),
                reason: "test".to_string(),
            })
            .await;

        assert!(result.is_err());
        assert_eq!(gateway.call_count(MockMethod::Refund), 1);
        assert!(gateway.refund_requests().is_empty());
    }
}
