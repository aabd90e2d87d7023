//! Reconciliation sweep - background repair of the enrollment views.
//!
//! The ledger is the source of truth. Each pass walks it and makes the two
//! enrollment views agree:
//!
//! - every `completed` purchase has its buyer enrolled and on the roster
//! - every `refunded` purchase whose pair has no completed purchase is
//!   absent from both views
//! - pending purchases that never got a gateway order are expired
//!
//! Repairs go through [`EnrollmentFanout`], so an exhausted repair is
//! reported to operators the same way a live fan-out failure is.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};

use crate::application::handlers::purchase::{EnrollmentFanout, FanoutDirection};
use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::purchase::{Purchase, PurchaseStatus};
use crate::ports::{BuyerDirectory, CourseRoster, PurchaseRepository};

/// Failure reason written onto expired pending purchases.
pub const ABANDONED_ORDER_REASON: &str = "order initiation abandoned";

/// Configuration for the reconciliation sweep.
#[derive(Debug, Clone)]
pub struct ReconciliationSweepConfig {
    /// Time between passes.
    pub interval: Duration,

    /// Page size when walking the ledger.
    pub batch_size: u32,

    /// Age after which an order-less pending purchase is expired.
    pub pending_expiry: Duration,
}

impl Default for ReconciliationSweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            batch_size: 200,
            pending_expiry: Duration::from_secs(3600),
        }
    }
}

impl ReconciliationSweepConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_pending_expiry(mut self, expiry: Duration) -> Self {
        self.pending_expiry = expiry;
        self
    }
}

/// Counters for one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Completed and refunded purchases inspected.
    pub checked: usize,
    /// View memberships added or removed.
    pub repaired: usize,
    /// Pending purchases marked failed.
    pub expired: usize,
    /// Repairs or expiries that did not stick this pass.
    pub failed: usize,
}

/// Background worker that keeps the enrollment views consistent with the ledger.
pub struct ReconciliationSweep {
    repository: Arc<dyn PurchaseRepository>,
    buyers: Arc<dyn BuyerDirectory>,
    roster: Arc<dyn CourseRoster>,
    fanout: EnrollmentFanout,
    config: ReconciliationSweepConfig,
}

impl ReconciliationSweep {
    pub fn new(
        repository: Arc<dyn PurchaseRepository>,
        buyers: Arc<dyn BuyerDirectory>,
        roster: Arc<dyn CourseRoster>,
        fanout: EnrollmentFanout,
        config: ReconciliationSweepConfig,
    ) -> Self {
        Self {
            repository,
            buyers,
            roster,
            fanout,
            config,
        }
    }

    /// Runs a pass every interval until `shutdown` flips to `true`.
    ///
    /// A failed pass is logged and the loop keeps going; the next pass
    /// starts from scratch.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), DomainError> {
        let mut interval = time::interval(self.config.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Reconciliation sweep stopping");
                        return Ok(());
                    }
                }

                _ = interval.tick() => {
                    match self.run_once().await {
                        Ok(report) => log_report(&report),
                        Err(e) => warn!(error = %e, "Reconciliation sweep pass failed"),
                    }
                }
            }
        }
    }

    /// Runs exactly one pass.
    ///
    /// # Errors
    ///
    /// Returns the first ledger or view read error. Per-purchase repair
    /// failures are counted in [`SweepReport::failed`] instead.
    pub async fn run_once(&self) -> Result<SweepReport, DomainError> {
        let mut report = SweepReport::default();

        self.repair_completed(&mut report).await?;
        self.repair_refunded(&mut report).await?;
        self.expire_stale_pending(&mut report).await?;

        Ok(report)
    }

    async fn repair_completed(&self, report: &mut SweepReport) -> Result<(), DomainError> {
        let mut offset = 0;
        loop {
            let page = self
                .repository
                .list_by_status(PurchaseStatus::Completed, offset, self.config.batch_size)
                .await?;

            for purchase in &page {
                report.checked += 1;
                if self.fully_enrolled(purchase).await? {
                    continue;
                }
                self.repair(FanoutDirection::Enroll, purchase, report).await;
            }

            if (page.len() as u32) < self.config.batch_size {
                return Ok(());
            }
            offset += self.config.batch_size;
        }
    }

    async fn repair_refunded(&self, report: &mut SweepReport) -> Result<(), DomainError> {
        let mut offset = 0;
        loop {
            let page = self
                .repository
                .list_by_status(PurchaseStatus::Refunded, offset, self.config.batch_size)
                .await?;

            for purchase in &page {
                report.checked += 1;

                // A later purchase of the same course owns the membership now.
                let repurchased = self
                    .repository
                    .find_completed(&purchase.buyer_id, &purchase.course_id)
                    .await?
                    .is_some();
                if repurchased || !self.partially_enrolled(purchase).await? {
                    continue;
                }
                self.repair(FanoutDirection::Retract, purchase, report).await;
            }

            if (page.len() as u32) < self.config.batch_size {
                return Ok(());
            }
            offset += self.config.batch_size;
        }
    }

    async fn expire_stale_pending(&self, report: &mut SweepReport) -> Result<(), DomainError> {
        let cutoff = Timestamp::now().minus_secs(self.config.pending_expiry.as_secs() as i64);
        let stale = self
            .repository
            .find_stale_pending(cutoff, self.config.batch_size)
            .await?;

        for mut purchase in stale {
            if purchase.fail(ABANDONED_ORDER_REASON).is_err() {
                continue;
            }
            match self
                .repository
                .update_if_status(&purchase, PurchaseStatus::Pending)
                .await
            {
                Ok(true) => {
                    debug!(purchase_id = %purchase.id, "Expired abandoned pending purchase");
                    report.expired += 1;
                }
                // Someone attached an order or settled it since we read it.
                Ok(false) => {}
                Err(e) => {
                    warn!(purchase_id = %purchase.id, error = %e, "Failed to expire pending purchase");
                    report.failed += 1;
                }
            }
        }
        Ok(())
    }

    async fn repair(&self, direction: FanoutDirection, purchase: &Purchase, report: &mut SweepReport) {
        info!(
            purchase_id = %purchase.id,
            buyer_id = %purchase.buyer_id,
            course_id = %purchase.course_id,
            direction = direction.as_str(),
            "Repairing enrollment views"
        );
        match self.fanout.run_to_completion(direction, purchase).await {
            Ok(()) => report.repaired += 1,
            Err(_) => report.failed += 1,
        }
    }

    async fn enrolled_in_directory(&self, purchase: &Purchase) -> Result<bool, DomainError> {
        Ok(self
            .buyers
            .enrollments(&purchase.buyer_id)
            .await?
            .iter()
            .any(|e| e.course_id == purchase.course_id))
    }

    async fn fully_enrolled(&self, purchase: &Purchase) -> Result<bool, DomainError> {
        Ok(self.enrolled_in_directory(purchase).await?
            && self
                .roster
                .has_student(&purchase.course_id, &purchase.buyer_id)
                .await?)
    }

    async fn partially_enrolled(&self, purchase: &Purchase) -> Result<bool, DomainError> {
        Ok(self.enrolled_in_directory(purchase).await?
            || self
                .roster
                .has_student(&purchase.course_id, &purchase.buyer_id)
                .await?)
    }
}

fn log_report(report: &SweepReport) {
    if report.repaired + report.expired + report.failed == 0 {
        debug!(checked = report.checked, "Reconciliation sweep found nothing to repair");
    } else {
        info!(
            checked = report.checked,
            repaired = report.repaired,
            expired = report.expired,
            failed = report.failed,
            "Reconciliation sweep pass complete"
        );
    }
}
