//! Purchase status state machine.
//!
//! ```text
//! pending ──► completed ──► refunded
//!    │
//!    └──────► failed
//! ```

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a purchase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    /// Gateway order requested, no verified payment yet.
    Pending,

    /// Verified payment applied. The buyer is entitled to the course.
    Completed,

    /// Gateway confirmed the refund. Entitlement withdrawn.
    Refunded,

    /// Gateway reported failure, or initiation was abandoned.
    Failed,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Completed => "completed",
            PurchaseStatus::Refunded => "refunded",
            PurchaseStatus::Failed => "failed",
        }
    }

    /// Only completed purchases grant enrollment.
    pub fn grants_enrollment(&self) -> bool {
        matches!(self, PurchaseStatus::Completed)
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PurchaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(PurchaseStatus::Pending),
            "completed" => Ok(PurchaseStatus::Completed),
            "refunded" => Ok(PurchaseStatus::Refunded),
            "failed" => Ok(PurchaseStatus::Failed),
            other => Err(format!("unknown purchase status '{}'", other)),
        }
    }
}

impl StateMachine for PurchaseStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use PurchaseStatus::*;
        matches!(
            (self, target),
            (Pending, Completed) | (Pending, Failed) | (Completed, Refunded)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use PurchaseStatus::*;
        match self {
            Pending => vec![Completed, Failed],
            Completed => vec![Refunded],
            Refunded | Failed => vec![],
        }
    }
}
