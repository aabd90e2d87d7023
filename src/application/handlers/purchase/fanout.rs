//! EnrollmentFanout - propagates ledger transitions into the enrollment views.
//!
//! Completion adds the course to the buyer's enrolled-course set and the
//! buyer to the course roster; refund removes both. Both view writes are
//! idempotent set operations, so a failed attempt is simply repeated.
//!
//! The first attempt runs inline. If it fails, the remaining attempts run
//! on a background task so webhook responses are not held up, and an
//! exhausted retry budget is reported to operators.
//!
//! Every retry reloads the purchase first and drops the write if the ledger
//! has moved on: an enroll only proceeds while the purchase is still
//! completed, a retract only while it is refunded and no later purchase of
//! the same course is completed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::try_join;
use tokio::sync::Notify;
use tracing::{debug, error, warn};

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::purchase::{Purchase, PurchaseStatus};
use crate::ports::{
    BuyerDirectory, CourseRoster, InconsistencyKind, InconsistencyReport, InconsistencyReporter,
    PurchaseRepository,
};

use super::retry::{retry_with_backoff, RetryPolicy};

/// Which way the views should move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutDirection {
    Enroll,
    Retract,
}

impl FanoutDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            FanoutDirection::Enroll => "enroll",
            FanoutDirection::Retract => "retract",
        }
    }
}

/// What happened to the view writes by the time the caller got control back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutOutcome {
    /// Both views were updated inline.
    Applied,
    /// Inline attempt failed; retries continue in the background.
    Deferred,
    /// Inline attempt failed and no retries remain; operators were notified.
    Exhausted,
}

/// Retrying executor for enrollment view writes.
#[derive(Clone)]
pub struct EnrollmentFanout {
    repository: Arc<dyn PurchaseRepository>,
    buyers: Arc<dyn BuyerDirectory>,
    roster: Arc<dyn CourseRoster>,
    reporter: Arc<dyn InconsistencyReporter>,
    policy: RetryPolicy,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl EnrollmentFanout {
    pub fn new(
        repository: Arc<dyn PurchaseRepository>,
        buyers: Arc<dyn BuyerDirectory>,
        roster: Arc<dyn CourseRoster>,
        reporter: Arc<dyn InconsistencyReporter>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            repository,
            buyers,
            roster,
            reporter,
            policy,
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// One attempt at both view writes, run concurrently.
    pub async fn apply_once(
        &self,
        direction: FanoutDirection,
        purchase: &Purchase,
    ) -> Result<(), DomainError> {
        let buyer = &purchase.buyer_id;
        let course = &purchase.course_id;

        match direction {
            FanoutDirection::Enroll => {
                let enrolled_at = purchase.completed_at.unwrap_or_else(Timestamp::now);
                try_join(
                    self.buyers.add_enrollment(buyer, course, enrolled_at),
                    self.roster.add_student(course, buyer),
                )
                .await?;
            }
            FanoutDirection::Retract => {
                try_join(
                    self.buyers.remove_enrollment(buyer, course),
                    self.roster.remove_student(course, buyer),
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Whether the ledger still calls for `direction` on this purchase.
    async fn still_applies(
        &self,
        direction: FanoutDirection,
        purchase: &Purchase,
    ) -> Result<bool, DomainError> {
        let Some(current) = self.repository.find_by_id(&purchase.id).await? else {
            return Ok(false);
        };
        match direction {
            FanoutDirection::Enroll => Ok(current.status == PurchaseStatus::Completed),
            FanoutDirection::Retract => {
                if current.status != PurchaseStatus::Refunded {
                    return Ok(false);
                }
                let repurchased = self
                    .repository
                    .find_completed(&current.buyer_id, &current.course_id)
                    .await?
                    .is_some();
                Ok(!repurchased)
            }
        }
    }

    /// One attempt, skipped when the purchase has since moved elsewhere.
    async fn apply_if_current(
        &self,
        direction: FanoutDirection,
        purchase: &Purchase,
    ) -> Result<(), DomainError> {
        if !self.still_applies(direction, purchase).await? {
            debug!(
                purchase_id = %purchase.id,
                direction = direction.as_str(),
                "Ledger moved on, dropping stale enrollment update"
            );
            return Ok(());
        }
        self.apply_once(direction, purchase).await
    }

    /// Runs the first attempt inline and hands any remaining attempts to a
    /// background task.
    pub async fn dispatch(&self, direction: FanoutDirection, purchase: &Purchase) -> FanoutOutcome {
        match self.apply_once(direction, purchase).await {
            Ok(()) => {
                debug!(
                    purchase_id = %purchase.id,
                    direction = direction.as_str(),
                    "Enrollment views updated"
                );
                FanoutOutcome::Applied
            }
            Err(e) if self.policy.max_attempts <= 1 => {
                self.report_exhausted(direction, purchase, &e).await;
                FanoutOutcome::Exhausted
            }
            Err(e) => {
                warn!(
                    purchase_id = %purchase.id,
                    direction = direction.as_str(),
                    error = %e,
                    "Enrollment view update failed, retrying in background"
                );
                self.spawn_retries(direction, purchase.clone());
                FanoutOutcome::Deferred
            }
        }
    }

    /// Runs every attempt to completion in the caller's task.
    ///
    /// Reports to operators when the budget is exhausted.
    pub async fn run_to_completion(
        &self,
        direction: FanoutDirection,
        purchase: &Purchase,
    ) -> Result<(), DomainError> {
        let context = format!("fanout.{}", direction.as_str());
        let result = retry_with_backoff(&self.policy, &context, |_| true, || {
            self.apply_if_current(direction, purchase)
        })
        .await;

        if let Err(e) = &result {
            self.report_exhausted(direction, purchase, e).await;
        }
        result
    }

    /// Waits until no background retries are running.
    pub async fn drain(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Number of background retry tasks still running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    fn spawn_retries(&self, direction: FanoutDirection, purchase: Purchase) {
        let fanout = self.clone();
        // The inline attempt already used one slot of the budget.
        let remaining = RetryPolicy::new(
            self.policy.max_attempts.saturating_sub(1),
            self.policy.initial_delay,
            self.policy.max_delay,
        );

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        tokio::spawn(async move {
            tokio::time::sleep(fanout.policy.delay_after(1)).await;

            let context = format!("fanout.{}", direction.as_str());
            let result = retry_with_backoff(&remaining, &context, |_| true, || {
                fanout.apply_if_current(direction, &purchase)
            })
            .await;

            if let Err(e) = result {
                fanout.report_exhausted(direction, &purchase, &e).await;
            }

            if fanout.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
                fanout.idle.notify_waiters();
            }
        });
    }

    async fn report_exhausted(
        &self,
        direction: FanoutDirection,
        purchase: &Purchase,
        cause: &DomainError,
    ) {
        error!(
            target: "operator",
            purchase_id = %purchase.id,
            buyer_id = %purchase.buyer_id,
            course_id = %purchase.course_id,
            direction = direction.as_str(),
            error = %cause,
            "Enrollment views diverged from ledger after all retries"
        );
        self.reporter
            .report(InconsistencyReport::new(
                InconsistencyKind::FanoutExhausted,
                purchase.id,
                purchase.buyer_id.clone(),
                purchase.course_id,
                format!("{} failed after retries: {}", direction.as_str(), cause),
            ))
            .await;
    }
}
