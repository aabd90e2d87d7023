//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables with the
//! `config` and `dotenvy` crates. Variables use the `COURSE_ENROLLMENT`
//! prefix and `__` between nested keys.
//!
//! # Example
//!
//! ```no_run
//! use course_enrollment::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod database;
mod error;
mod payment;
mod reconciliation;
mod server;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use reconciliation::ReconciliationConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub database: DatabaseConfig,

    #[serde(default)]
    pub payment: PaymentConfig,

    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
}

impl AppConfig {
    /// Load configuration from the environment
    ///
    /// 1. Loads `.env` if present (development)
    /// 2. Reads variables with the `COURSE_ENROLLMENT` prefix
    /// 3. Splits nested keys on `__`
    ///
    /// - `COURSE_ENROLLMENT__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `COURSE_ENROLLMENT__PAYMENT__PROVIDER=stripe` -> `payment.provider`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required value is missing or cannot be
    /// parsed into its field type.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("COURSE_ENROLLMENT")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Semantic validation of every section
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.payment.validate(self.is_production())?;
        self.reconciliation.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
