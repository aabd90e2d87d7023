//! Reconciliation configuration: fan-out retries, refunds and the sweep

use serde::Deserialize;
use std::time::Duration;

use crate::adapters::workers::ReconciliationSweepConfig;
use crate::application::handlers::purchase::RetryPolicy;
use crate::domain::purchase::RefundPolicy;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationConfig {
    #[serde(default = "default_fanout_max_attempts")]
    pub fanout_max_attempts: u32,
    #[serde(default = "default_fanout_initial_delay_ms")]
    pub fanout_initial_delay_ms: u64,
    #[serde(default = "default_fanout_max_delay_ms")]
    pub fanout_max_delay_ms: u64,

    /// Attempts for the gateway payment lookup during client verification
    #[serde(default = "default_fetch_max_attempts")]
    pub fetch_max_attempts: u32,

    #[serde(default = "default_refund_window_days")]
    pub refund_window_days: u32,

    #[serde(default = "default_sweep_enabled")]
    pub sweep_enabled: bool,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: u32,
    #[serde(default = "default_pending_expiry_secs")]
    pub pending_expiry_secs: u64,
}

impl ReconciliationConfig {
    pub fn fanout_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.fanout_max_attempts,
            Duration::from_millis(self.fanout_initial_delay_ms),
            Duration::from_millis(self.fanout_max_delay_ms),
        )
    }

    /// Gateway lookups reuse the fan-out backoff shape.
    pub fn fetch_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.fetch_max_attempts,
            Duration::from_millis(self.fanout_initial_delay_ms),
            Duration::from_millis(self.fanout_max_delay_ms),
        )
    }

    /// Recording a refund the gateway already accepted uses the fan-out schedule.
    pub fn ledger_policy(&self) -> RetryPolicy {
        self.fanout_policy()
    }

    pub fn refund_policy(&self) -> RefundPolicy {
        RefundPolicy::new(self.refund_window_days)
    }

    pub fn sweep_config(&self) -> ReconciliationSweepConfig {
        ReconciliationSweepConfig::default()
            .with_interval(Duration::from_secs(self.sweep_interval_secs))
            .with_batch_size(self.sweep_batch_size)
            .with_pending_expiry(Duration::from_secs(self.pending_expiry_secs))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.fanout_max_attempts == 0 {
            return Err(ValidationError::InvalidReconciliation("fanout_max_attempts"));
        }
        if self.fanout_initial_delay_ms > self.fanout_max_delay_ms {
            return Err(ValidationError::InvalidReconciliation("fanout_initial_delay_ms"));
        }
        if self.fetch_max_attempts == 0 {
            return Err(ValidationError::InvalidReconciliation("fetch_max_attempts"));
        }
        if self.sweep_enabled && self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidReconciliation("sweep_interval_secs"));
        }
        if self.sweep_batch_size == 0 {
            return Err(ValidationError::InvalidReconciliation("sweep_batch_size"));
        }
        Ok(())
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            fanout_max_attempts: default_fanout_max_attempts(),
            fanout_initial_delay_ms: default_fanout_initial_delay_ms(),
            fanout_max_delay_ms: default_fanout_max_delay_ms(),
            fetch_max_attempts: default_fetch_max_attempts(),
            refund_window_days: default_refund_window_days(),
            sweep_enabled: default_sweep_enabled(),
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_batch_size: default_sweep_batch_size(),
            pending_expiry_secs: default_pending_expiry_secs(),
        }
    }
}

fn default_fanout_max_attempts() -> u32 {
    3
}

fn default_fanout_initial_delay_ms() -> u64 {
    200
}

fn default_fanout_max_delay_ms() -> u64 {
    5000
}

fn default_fetch_max_attempts() -> u32 {
    3
}

fn default_refund_window_days() -> u32 {
    7
}

fn default_sweep_enabled() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_sweep_batch_size() -> u32 {
    200
}

fn default_pending_expiry_secs() -> u64 {
    3600
}
