//! Payment gateway port for external payment processing.
//!
//! Defines the contract for gateway integrations (Stripe hosted checkout,
//! Razorpay orders). Adapters translate provider shapes into
//! [`GatewayEvent`] and [`PaymentDetails`] so reconciliation stays
//! provider agnostic.
//!
//! # Design
//!
//! - **Amount echo**: `create_order` returns the amount the gateway
//!   actually registered so callers can detect tampering or rounding
//! - **Authenticated input only**: webhooks are verified before parsing
//! - **Idempotent reads**: `fetch_payment` may be retried freely

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{CourseId, Money, PurchaseId, UserId};
use crate::domain::purchase::{GatewayEvent, GatewayKind, PurchaseError, WebhookError};

/// Port for payment gateway integrations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Which gateway this adapter talks to.
    fn kind(&self) -> GatewayKind;

    /// HTTP header carrying the webhook signature.
    fn signature_header(&self) -> &'static str;

    /// Opens a gateway order for the purchase.
    ///
    /// The gateway must be asked for exactly `request.amount`.
    async fn create_order(&self, request: CreateOrderRequest) -> Result<GatewayOrder, GatewayError>;

    /// Verifies a webhook signature over the raw body and parses the event.
    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<GatewayEvent, WebhookError>;

    /// Checks a client-relayed signature over the order and payment refs.
    ///
    /// Returns `Ok(false)` for a forged or mismatched signature, and an
    /// `Unsupported` error when the gateway has no client relay flow.
    async fn verify_client_signature(
        &self,
        order_ref: &str,
        payment_ref: &str,
        signature: &str,
    ) -> Result<bool, GatewayError>;

    /// Reads payment details from the gateway.
    async fn fetch_payment(&self, payment_ref: &str) -> Result<PaymentDetails, GatewayError>;

    /// Requests a refund of a captured payment.
    async fn refund(&self, request: RefundRequest) -> Result<RefundReceipt, GatewayError>;
}

/// Request to open a gateway order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    /// Internal purchase id (stored as gateway metadata).
    pub purchase_id: PurchaseId,

    pub buyer_id: UserId,

    pub course_id: CourseId,

    /// Shown on hosted checkout pages.
    pub course_title: String,

    /// Amount in minor units.
    pub amount: Money,
}

/// Order opened at the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    /// Gateway order or session reference.
    pub order_ref: String,

    /// Amount the gateway registered, in minor units.
    pub amount: i64,

    /// Currency the gateway registered (ISO 4217, any case).
    pub currency: String,

    /// What the client needs to continue checkout.
    pub checkout: CheckoutArtifact,
}

/// Client-facing continuation of a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckoutArtifact {
    /// Redirect to a hosted checkout page.
    Redirect { url: String },

    /// Open an in-page checkout widget for this order.
    #[serde(rename_all = "camelCase")]
    Order {
        order_id: String,
        amount: i64,
        currency: String,
        key_id: String,
    },
}

/// Payment details as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub payment_ref: String,

    /// Order the payment belongs to, when the gateway reports it.
    pub order_ref: Option<String>,

    pub method: Option<String>,

    /// Settled amount in minor units.
    pub settled_amount: Option<i64>,
}

/// Request to refund a captured payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub purchase_id: PurchaseId,

    pub payment_ref: String,

    /// Amount to refund in minor units.
    pub amount: Money,

    pub reason: String,
}

/// Gateway acknowledgement of a refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub refund_ref: String,

    pub status: RefundStatus,
}

/// Refund state reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    /// Accepted, settling asynchronously.
    Pending,
    Processed,
    Failed,
}

impl RefundStatus {
    /// Pending and processed refunds are both accepted by the gateway.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, RefundStatus::Failed)
    }
}

/// Errors from payment gateway operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayError {
    /// Error code for categorization.
    pub code: GatewayErrorCode,

    /// Human-readable message (server-side only).
    pub message: String,

    /// Provider's error code (if available).
    pub provider_code: Option<String>,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl GatewayError {
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::NetworkError, message)
    }

    pub fn timeout() -> Self {
        Self::new(GatewayErrorCode::Timeout, "gateway call timed out")
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::AuthenticationError, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(GatewayErrorCode::NotFound, format!("{} not found", resource))
    }

    pub fn unsupported(operation: &str) -> Self {
        Self::new(
            GatewayErrorCode::Unsupported,
            format!("{} is not supported by this gateway", operation),
        )
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::ProviderError, message)
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayError {}

impl From<GatewayError> for PurchaseError {
    fn from(err: GatewayError) -> Self {
        match err.code {
            GatewayErrorCode::Timeout => PurchaseError::GatewayTimeout,
            GatewayErrorCode::Unsupported => {
                PurchaseError::validation("gateway", err.message)
            }
            _ => PurchaseError::gateway(err.to_string(), err.retryable),
        }
    }
}

/// Gateway error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorCode {
    /// Network connectivity issue.
    NetworkError,

    /// Call exceeded the configured timeout.
    Timeout,

    /// API credentials rejected.
    AuthenticationError,

    NotFound,

    /// Rate limit exceeded.
    RateLimited,

    /// Operation not offered by this gateway.
    Unsupported,

    /// Provider rejected the request.
    ProviderError,

    Unknown,
}

impl GatewayErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayErrorCode::NetworkError | GatewayErrorCode::Timeout | GatewayErrorCode::RateLimited
        )
    }
}

impl std::fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GatewayErrorCode::NetworkError => "network_error",
            GatewayErrorCode::Timeout => "timeout",
            GatewayErrorCode::AuthenticationError => "authentication_error",
            GatewayErrorCode::NotFound => "not_found",
            GatewayErrorCode::RateLimited => "rate_limited",
            GatewayErrorCode::Unsupported => "unsupported",
            GatewayErrorCode::ProviderError => "provider_error",
            GatewayErrorCode::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}
