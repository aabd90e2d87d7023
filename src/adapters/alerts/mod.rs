//! Inconsistency reporters.
//!
//! Production reports go to the `operator` tracing target, which deployments
//! route to their paging channel. The recording reporter keeps reports in
//! memory for assertions.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::error;

use crate::ports::{InconsistencyReport, InconsistencyReporter};

/// Emits each report as a structured `error!` on the `operator` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInconsistencyReporter;

impl TracingInconsistencyReporter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl InconsistencyReporter for TracingInconsistencyReporter {
    async fn report(&self, report: InconsistencyReport) {
        error!(
            target: "operator",
            kind = report.kind.as_str(),
            purchase_id = %report.purchase_id,
            buyer_id = %report.buyer_id,
            course_id = %report.course_id,
            detected_at = %report.detected_at.as_datetime(),
            detail = %report.detail,
            "Purchase ledger inconsistency"
        );
    }
}

/// Keeps every report for later inspection.
#[derive(Debug, Default)]
pub struct RecordingInconsistencyReporter {
    reports: RwLock<Vec<InconsistencyReport>>,
}

impl RecordingInconsistencyReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reports(&self) -> Vec<InconsistencyReport> {
        self.reports.read().await.clone()
    }
}

#[async_trait]
impl InconsistencyReporter for RecordingInconsistencyReporter {
    async fn report(&self, report: InconsistencyReport) {
        self.reports.write().await.push(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{CourseId, PurchaseId, UserId};
    use crate::ports::InconsistencyKind;

    #[tokio::test]
    async fn recording_reporter_keeps_reports_in_order() {
        let reporter = RecordingInconsistencyReporter::new();
        for kind in [
            InconsistencyKind::FanoutExhausted,
            InconsistencyKind::ConflictingConfirmation,
        ] {
            reporter
                .report(InconsistencyReport::new(
                    kind,
                    PurchaseId::new(),
                    UserId::new("buyer-1").unwrap(),
                    CourseId::new(),
                    "detail",
                ))
                .await;
        }

        let reports = reporter.reports().await;
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1].kind, InconsistencyKind::ConflictingConfirmation);
    }

    #[tokio::test]
    async fn tracing_reporter_does_not_panic() {
        TracingInconsistencyReporter::new()
            .report(InconsistencyReport::new(
                InconsistencyKind::CaptureOnClosedPurchase,
                PurchaseId::new(),
                UserId::new("buyer-1").unwrap(),
                CourseId::new(),
                "capture arrived for failed purchase",
            ))
            .await;
    }
}
