//! Stripe hosted-checkout gateway.
//!
//! Orders are Checkout Sessions; the buyer is redirected to Stripe and the
//! purchase is completed by the `checkout.session.completed` webhook. There
//! is no client-relayed confirmation in this flow.
//!
//! # Security
//!
//! - Webhooks are authenticated with [`StripeSignatureVerifier`]
//!   (HMAC-SHA256, constant-time, 5 minute replay window)
//! - API key and webhook secret are held as `secrecy::SecretString`

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::adapters::gateway_http::{read_json, transport_error};
use crate::domain::purchase::{
    GatewayEvent, GatewayKind, PaymentConfirmation, StripeSignatureVerifier, WebhookError,
};
use crate::ports::{
    CheckoutArtifact, CreateOrderRequest, GatewayError, GatewayOrder, PaymentDetails,
    PaymentGateway, RefundReceipt, RefundRequest,
};

use super::types::{
    StripeCheckoutSession, StripeEvent, StripePaymentIntent, StripeRefund,
};

const PROVIDER: &str = "stripe";

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Webhook signing secret (whsec_...).
    webhook_secret: SecretString,

    /// Base URL for the Stripe API.
    api_base_url: String,

    /// Storefront origin used for success and cancel redirects.
    client_url: String,

    /// Reject test-mode events.
    require_livemode: bool,
}

impl StripeConfig {
    pub fn new(
        api_key: SecretString,
        webhook_secret: SecretString,
        client_url: impl Into<String>,
    ) -> Self {
        Self {
            api_key,
            webhook_secret,
            api_base_url: "https://api.stripe.com".to_string(),
            client_url: client_url.into(),
            require_livemode: false,
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }
}

/// Stripe implementation of [`PaymentGateway`].
pub struct StripeGateway {
    config: StripeConfig,
    verifier: StripeSignatureVerifier,
    http_client: reqwest::Client,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Self {
        let verifier = StripeSignatureVerifier::new(config.webhook_secret.expose_secret().clone());
        Self {
            config,
            verifier,
            http_client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    /// Form body for `POST /v1/checkout/sessions`.
    fn checkout_form(&self, request: &CreateOrderRequest) -> Vec<(&'static str, String)> {
        let client_url = self.config.client_url.trim_end_matches('/');
        vec![
            ("mode", "payment".to_string()),
            ("payment_method_types[]", "card".to_string()),
            (
                "line_items[0][price_data][currency]",
                request.amount.currency.to_lowercase(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                request.course_title.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                request.amount.minor_units.to_string(),
            ),
            ("line_items[0][quantity]", "1".to_string()),
            (
                "success_url",
                format!("{}/course-progress/{}", client_url, request.course_id),
            ),
            (
                "cancel_url",
                format!("{}/course-detail/{}", client_url, request.course_id),
            ),
            ("metadata[courseId]", request.course_id.to_string()),
            ("metadata[userId]", request.buyer_id.to_string()),
            ("metadata[purchaseId]", request.purchase_id.to_string()),
        ]
    }

    /// Translates an authenticated event into a [`GatewayEvent`].
    fn parse_event(&self, payload: &[u8]) -> Result<GatewayEvent, WebhookError> {
        let event: StripeEvent = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;

        if self.config.require_livemode && !event.livemode {
            tracing::warn!(event_id = %event.id, "Rejected test mode event");
            return Ok(GatewayEvent::Ignored {
                event_id: event.id,
                event_type: event.event_type,
            });
        }

        let session = || -> Result<StripeCheckoutSession, WebhookError> {
            serde_json::from_value(event.data.object.clone())
                .map_err(|e| WebhookError::MalformedPayload(format!("checkout session: {}", e)))
        };

        match event.event_type.as_str() {
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
                let session = session()?;
                if !session.is_paid() {
                    // Delayed methods settle later via async_payment_succeeded.
                    return Ok(GatewayEvent::Ignored {
                        event_id: event.id,
                        event_type: event.event_type,
                    });
                }
                let payment_ref = session
                    .payment_intent
                    .ok_or(WebhookError::MissingField("payment_intent"))?;
                let mut confirmation = PaymentConfirmation::new(session.id, payment_ref);
                confirmation.settled_amount = session.amount_total;
                Ok(GatewayEvent::PaymentCaptured {
                    event_id: event.id,
                    confirmation,
                })
            }
            "checkout.session.expired" | "checkout.session.async_payment_failed" => {
                let session = session()?;
                let reason = if event.event_type.ends_with("expired") {
                    "checkout session expired"
                } else {
                    "asynchronous payment failed"
                };
                Ok(GatewayEvent::PaymentFailed {
                    event_id: event.id,
                    order_ref: session.id,
                    reason: reason.to_string(),
                })
            }
            _ => Ok(GatewayEvent::Ignored {
                event_id: event.id,
                event_type: event.event_type,
            }),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Stripe
    }

    fn signature_header(&self) -> &'static str {
        "stripe-signature"
    }

    async fn create_order(&self, request: CreateOrderRequest) -> Result<GatewayOrder, GatewayError> {
        let response = self
            .http_client
            .post(self.url("/v1/checkout/sessions"))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .header("Idempotency-Key", request.purchase_id.to_string())
            .form(&self.checkout_form(&request))
            .send()
            .await
            .map_err(transport_error)?;

        let session: StripeCheckoutSession = read_json(PROVIDER, "create_order", response).await?;

        let url = session
            .url
            .ok_or_else(|| GatewayError::provider("checkout session has no redirect url"))?;
        let amount = session
            .amount_total
            .ok_or_else(|| GatewayError::provider("checkout session has no amount_total"))?;

        Ok(GatewayOrder {
            order_ref: session.id,
            amount,
            currency: session
                .currency
                .unwrap_or_else(|| request.amount.currency.to_lowercase()),
            checkout: CheckoutArtifact::Redirect { url },
        })
    }

    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<GatewayEvent, WebhookError> {
        self.verifier.verify(payload, signature)?;
        self.parse_event(payload)
    }

    async fn verify_client_signature(
        &self,
        _order_ref: &str,
        _payment_ref: &str,
        _signature: &str,
    ) -> Result<bool, GatewayError> {
        Err(GatewayError::unsupported("client-relayed confirmation"))
    }

    async fn fetch_payment(&self, payment_ref: &str) -> Result<PaymentDetails, GatewayError> {
        let response = self
            .http_client
            .get(self.url(&format!("/v1/payment_intents/{}", payment_ref)))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(transport_error)?;

        let intent: StripePaymentIntent = read_json(PROVIDER, "fetch_payment", response).await?;

        Ok(PaymentDetails {
            payment_ref: intent.id,
            order_ref: None,
            method: intent.payment_method_types.into_iter().next(),
            settled_amount: intent.amount_received,
        })
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundReceipt, GatewayError> {
        let params = [
            ("payment_intent", request.payment_ref.clone()),
            ("amount", request.amount.minor_units.to_string()),
            ("metadata[reason]", request.reason.clone()),
            ("metadata[purchaseId]", request.purchase_id.to_string()),
        ];

        let response = self
            .http_client
            .post(self.url("/v1/refunds"))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .header("Idempotency-Key", format!("refund_{}", request.purchase_id))
            .form(&params)
            .send()
            .await
            .map_err(transport_error)?;

        let refund: StripeRefund = read_json(PROVIDER, "refund", response).await?;

        Ok(RefundReceipt {
            status: refund.refund_status(),
            refund_ref: refund.id,
        })
    }
}
