//! Payment confirmation authenticity checks.
//!
//! Three HMAC-SHA256 schemes are supported:
//!
//! - **Stripe webhooks**: `Stripe-Signature: t=<ts>,v1=<hex>` over
//!   `"{t}.{payload}"`, with timestamp validation against replay.
//! - **Razorpay webhooks**: `X-Razorpay-Signature: <hex>` over the raw body.
//! - **Client-relayed confirmations**: hex HMAC over `"{order}|{payment}"`
//!   keyed by the gateway API secret.
//!
//! All comparisons are constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::webhook_errors::WebhookError;

/// Maximum allowed age for webhook events (5 minutes).
const MAX_EVENT_AGE_SECS: i64 = 300;

/// Maximum allowed clock skew for future events (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

type HmacSha256 = Hmac<Sha256>;

/// Computes raw HMAC-SHA256 bytes.
pub fn hmac_sha256(secret: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Computes HMAC-SHA256 as lower-case hex.
pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> String {
    hex::encode(hmac_sha256(secret, message))
}

/// Performs constant-time comparison of two byte slices.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

// ════════════════════════════════════════════════════════════════════════════════
// Stripe
// ════════════════════════════════════════════════════════════════════════════════

/// Parsed components from the Stripe-Signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp when the signature was generated.
    pub timestamp: i64,
    /// All v1 signatures present (several during secret rotation).
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parses a Stripe-Signature header string.
    ///
    /// Format: `t=<timestamp>,v1=<signature>[,v1=<signature>...]`
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or_else(|| WebhookError::MalformedSignature("invalid header format".into()))?;

            match key {
                "t" => {
                    timestamp = Some(value.parse().map_err(|_| {
                        WebhookError::MalformedSignature("invalid timestamp".into())
                    })?);
                }
                "v1" => {
                    v1_signatures.push(hex::decode(value).map_err(|_| {
                        WebhookError::MalformedSignature("invalid v1 signature hex".into())
                    })?);
                }
                _ => {
                    // v0 and future schemes are not trusted
                }
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| WebhookError::MalformedSignature("missing timestamp".into()))?;
        if v1_signatures.is_empty() {
            return Err(WebhookError::MalformedSignature("missing v1 signature".into()));
        }

        Ok(SignatureHeader {
            timestamp,
            v1_signatures,
        })
    }
}

/// Verifier for Stripe webhook signatures.
#[derive(Clone)]
pub struct StripeSignatureVerifier {
    secret: String,
}

impl StripeSignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verifies the signature header against the raw payload.
    ///
    /// # Errors
    ///
    /// - `MalformedSignature` - header could not be parsed
    /// - `TimestampOutOfRange` - event is older than 5 minutes
    /// - `InvalidTimestamp` - event timestamp is in the future
    /// - `InvalidSignature` - no v1 signature matches
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> Result<(), WebhookError> {
        self.verify_at(payload, signature_header, chrono::Utc::now().timestamp())
    }

    /// Same as [`verify`](Self::verify) with an explicit clock.
    pub fn verify_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<(), WebhookError> {
        let header = SignatureHeader::parse(signature_header)?;

        let age = now
            .checked_sub(header.timestamp)
            .ok_or(WebhookError::InvalidTimestamp)?;
        if age > MAX_EVENT_AGE_SECS {
            return Err(WebhookError::TimestampOutOfRange);
        }
        if age < -MAX_CLOCK_SKEW_SECS {
            return Err(WebhookError::InvalidTimestamp);
        }

        let expected = self.compute_signature(header.timestamp, payload);
        if header
            .v1_signatures
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate))
        {
            Ok(())
        } else {
            Err(WebhookError::InvalidSignature)
        }
    }

    /// Builds a `Stripe-Signature` header value for the payload.
    pub fn sign(&self, timestamp: i64, payload: &[u8]) -> String {
        format!(
            "t={},v1={}",
            timestamp,
            hex::encode(self.compute_signature(timestamp, payload))
        )
    }

    fn compute_signature(&self, timestamp: i64, payload: &[u8]) -> Vec<u8> {
        let mut signed_payload = format!("{}.", timestamp).into_bytes();
        signed_payload.extend_from_slice(payload);
        hmac_sha256(self.secret.as_bytes(), &signed_payload)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Razorpay
// ════════════════════════════════════════════════════════════════════════════════

/// Verifier for body-HMAC webhook signatures (Razorpay scheme).
#[derive(Clone)]
pub struct RazorpaySignatureVerifier {
    secret: String,
}

impl RazorpaySignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verifies a hex signature over the raw payload.
    pub fn verify(&self, payload: &[u8], signature_hex: &str) -> Result<(), WebhookError> {
        let provided = hex::decode(signature_hex.trim())
            .map_err(|_| WebhookError::MalformedSignature("signature is not hex".into()))?;
        let expected = hmac_sha256(self.secret.as_bytes(), payload);
        if constant_time_compare(&expected, &provided) {
            Ok(())
        } else {
            Err(WebhookError::InvalidSignature)
        }
    }

    /// Hex signature for the payload.
    pub fn sign(&self, payload: &[u8]) -> String {
        hmac_sha256_hex(self.secret.as_bytes(), payload)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Client-relayed confirmations
// ════════════════════════════════════════════════════════════════════════════════

/// Verifier for `order|payment` signatures relayed by the browser.
#[derive(Clone)]
pub struct ClientSignatureVerifier {
    key_secret: String,
}

impl ClientSignatureVerifier {
    pub fn new(key_secret: impl Into<String>) -> Self {
        Self {
            key_secret: key_secret.into(),
        }
    }

    /// Returns true only when the signature authenticates the pair.
    pub fn verify(&self, order_ref: &str, payment_ref: &str, signature_hex: &str) -> bool {
        let Ok(provided) = hex::decode(signature_hex.trim()) else {
            return false;
        };
        let expected = hmac_sha256(
            self.key_secret.as_bytes(),
            Self::message(order_ref, payment_ref).as_bytes(),
        );
        constant_time_compare(&expected, &provided)
    }

    /// Hex signature the gateway would hand to the browser.
    pub fn sign(&self, order_ref: &str, payment_ref: &str) -> String {
        hmac_sha256_hex(
            self.key_secret.as_bytes(),
            Self::message(order_ref, payment_ref).as_bytes(),
        )
    }

    fn message(order_ref: &str, payment_ref: &str) -> String {
        format!("{}|{}", order_ref, payment_ref)
    }
}
