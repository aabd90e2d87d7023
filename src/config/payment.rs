//! Payment configuration

use secrecy::SecretString;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use crate::adapters::razorpay::RazorpayConfig;
use crate::adapters::stripe::StripeConfig;
use crate::domain::foundation::Currency;
use crate::domain::purchase::GatewayKind;

use super::error::ValidationError;

/// Payment gateway configuration
///
/// Only the section for the selected `provider` has to be filled in.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// `stripe`, `razorpay`, or `mock` (development only)
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default)]
    pub stripe_api_key: String,
    #[serde(default)]
    pub stripe_webhook_secret: String,
    pub stripe_api_base_url: Option<String>,

    #[serde(default)]
    pub razorpay_key_id: String,
    #[serde(default)]
    pub razorpay_key_secret: String,
    #[serde(default)]
    pub razorpay_webhook_secret: String,
    pub razorpay_api_base_url: Option<String>,

    /// Frontend origin used for hosted-checkout return URLs
    #[serde(default = "default_client_url")]
    pub client_url: String,

    /// Currency assumed for catalog rows without one
    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default = "default_gateway_timeout")]
    pub gateway_timeout_secs: u64,
}

impl PaymentConfig {
    pub fn gateway_kind(&self) -> Result<GatewayKind, ValidationError> {
        GatewayKind::from_str(self.provider.trim())
            .map_err(|_| ValidationError::UnknownPaymentProvider(self.provider.clone()))
    }

    pub fn currency(&self) -> Result<Currency, ValidationError> {
        Currency::new(self.currency.trim())
            .map_err(|_| ValidationError::InvalidCurrency(self.currency.clone()))
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    pub fn is_stripe_live_mode(&self) -> bool {
        self.stripe_api_key.starts_with("sk_live_")
    }

    /// Stripe adapter settings. Live keys require live-mode events.
    pub fn stripe_config(&self) -> StripeConfig {
        let config = StripeConfig::new(
            SecretString::new(self.stripe_api_key.clone()),
            SecretString::new(self.stripe_webhook_secret.clone()),
            self.client_url.clone(),
        )
        .with_require_livemode(self.is_stripe_live_mode());
        match &self.stripe_api_base_url {
            Some(url) => config.with_base_url(url.clone()),
            None => config,
        }
    }

    pub fn razorpay_config(&self) -> RazorpayConfig {
        let config = RazorpayConfig::new(
            self.razorpay_key_id.clone(),
            SecretString::new(self.razorpay_key_secret.clone()),
            SecretString::new(self.razorpay_webhook_secret.clone()),
        );
        match &self.razorpay_api_base_url {
            Some(url) => config.with_base_url(url.clone()),
            None => config,
        }
    }

    /// Validate the settings of the selected provider
    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        self.currency()?;
        if self.gateway_timeout_secs == 0 || self.gateway_timeout_secs > 120 {
            return Err(ValidationError::InvalidGatewayTimeout);
        }

        match self.gateway_kind()? {
            GatewayKind::Stripe => {
                if self.stripe_api_key.is_empty() {
                    return Err(ValidationError::MissingRequired("PAYMENT__STRIPE_API_KEY"));
                }
                if self.stripe_webhook_secret.is_empty() {
                    return Err(ValidationError::MissingRequired(
                        "PAYMENT__STRIPE_WEBHOOK_SECRET",
                    ));
                }
                if !self.stripe_api_key.starts_with("sk_") {
                    return Err(ValidationError::InvalidStripeKey);
                }
                if !self.stripe_webhook_secret.starts_with("whsec_") {
                    return Err(ValidationError::InvalidStripeWebhookSecret);
                }
            }
            GatewayKind::Razorpay => {
                if self.razorpay_key_id.is_empty() {
                    return Err(ValidationError::MissingRequired("PAYMENT__RAZORPAY_KEY_ID"));
                }
                if self.razorpay_key_secret.is_empty() {
                    return Err(ValidationError::MissingRequired(
                        "PAYMENT__RAZORPAY_KEY_SECRET",
                    ));
                }
                if self.razorpay_webhook_secret.is_empty() {
                    return Err(ValidationError::MissingRequired(
                        "PAYMENT__RAZORPAY_WEBHOOK_SECRET",
                    ));
                }
                if !self.razorpay_key_id.starts_with("rzp_") {
                    return Err(ValidationError::InvalidRazorpayKeyId);
                }
            }
            GatewayKind::Mock => {
                if production {
                    return Err(ValidationError::MockProviderInProduction);
                }
            }
        }
        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            stripe_api_key: String::new(),
            stripe_webhook_secret: String::new(),
            stripe_api_base_url: None,
            razorpay_key_id: String::new(),
            razorpay_key_secret: String::new(),
            razorpay_webhook_secret: String::new(),
            razorpay_api_base_url: None,
            client_url: default_client_url(),
            currency: default_currency(),
            gateway_timeout_secs: default_gateway_timeout(),
        }
    }
}

fn default_provider() -> String {
    "razorpay".to_string()
}

fn default_client_url() -> String {
    "http://localhost:5173".to_string()
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_gateway_timeout() -> u64 {
    10
}
