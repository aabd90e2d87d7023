//! PostgreSQL implementation of PurchaseRepository.
//!
//! Status transitions are a single conditional `UPDATE ... WHERE status = $n`;
//! uniqueness of order references and of completed (buyer, course) pairs is
//! enforced by the schema and surfaced as domain error codes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{
    CourseId, Currency, DomainError, ErrorCode, Money, PurchaseId, Timestamp, UserId,
};
use crate::domain::purchase::{GatewayKind, Purchase, PurchaseStatus, RefundRecord};
use crate::ports::PurchaseRepository;

const ORDER_REF_CONSTRAINT: &str = "purchases_gateway_order_ref_key";
const COMPLETED_PAIR_CONSTRAINT: &str = "purchases_one_completed_per_pair";

const SELECT_COLUMNS: &str = r#"
    SELECT id, buyer_id, course_id, amount_minor, currency, status, gateway,
           gateway_order_ref, gateway_payment_ref, payment_method, failure_reason,
           refund_ref, refund_amount_minor, refund_reason, refunded_at,
           created_at, updated_at, completed_at
    FROM purchases
"#;

/// PostgreSQL implementation of the PurchaseRepository port.
pub struct PostgresPurchaseRepository {
    pool: PgPool,
}

impl PostgresPurchaseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a purchase.
#[derive(Debug, sqlx::FromRow)]
struct PurchaseRow {
    id: Uuid,
    buyer_id: String,
    course_id: Uuid,
    amount_minor: i64,
    currency: String,
    status: String,
    gateway: String,
    gateway_order_ref: Option<String>,
    gateway_payment_ref: Option<String>,
    payment_method: Option<String>,
    failure_reason: Option<String>,
    refund_ref: Option<String>,
    refund_amount_minor: Option<i64>,
    refund_reason: Option<String>,
    refunded_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

fn corrupt(what: &str, err: impl std::fmt::Display) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Invalid {}: {}", what, err))
}

impl TryFrom<PurchaseRow> for Purchase {
    type Error = DomainError;

    fn try_from(row: PurchaseRow) -> Result<Self, Self::Error> {
        let currency = Currency::new(row.currency.trim()).map_err(|e| corrupt("currency", e))?;
        let amount =
            Money::from_minor(row.amount_minor, currency.clone()).map_err(|e| corrupt("amount", e))?;
        let status: PurchaseStatus = row.status.parse().map_err(|e| corrupt("status", e))?;
        let gateway: GatewayKind = row.gateway.parse().map_err(|e| corrupt("gateway", e))?;

        let refund = match (row.refund_ref, row.refund_amount_minor, row.refunded_at) {
            (Some(refund_ref), Some(minor), Some(at)) => Some(RefundRecord {
                refund_ref,
                amount: Money::from_minor(minor, currency).map_err(|e| corrupt("refund", e))?,
                reason: row.refund_reason.unwrap_or_default(),
                refunded_at: Timestamp::from_datetime(at),
            }),
            _ => None,
        };

        Ok(Purchase {
            id: PurchaseId::from_uuid(row.id),
            buyer_id: UserId::new(row.buyer_id).map_err(|e| corrupt("buyer_id", e))?,
            course_id: CourseId::from_uuid(row.course_id),
            amount,
            status,
            gateway,
            gateway_order_ref: row.gateway_order_ref,
            gateway_payment_ref: row.gateway_payment_ref,
            payment_method: row.payment_method,
            failure_reason: row.failure_reason,
            refund,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            completed_at: row.completed_at.map(Timestamp::from_datetime),
        })
    }
}

/// Maps constraint violations to their domain codes.
fn write_error(operation: &str, e: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(db_err) = &e {
        match db_err.constraint() {
            Some(ORDER_REF_CONSTRAINT) => {
                return DomainError::new(
                    ErrorCode::DuplicateOrderRef,
                    "gateway order reference already recorded",
                )
            }
            Some(COMPLETED_PAIR_CONSTRAINT) => {
                return DomainError::new(
                    ErrorCode::DuplicateCompletion,
                    "buyer already holds a completed purchase of this course",
                )
            }
            _ => {}
        }
    }
    DomainError::database(format!("Failed to {} purchase: {}", operation, e))
}

fn into_purchases(purchases: Vec<PurchaseRow>) -> Result<Vec<Purchase>, DomainError> {
    purchases.into_iter().map(Purchase::try_from).collect()
}

#[async_trait]
impl PurchaseRepository for PostgresPurchaseRepository {
    async fn insert(&self, purchase: &Purchase) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO purchases (
                id, buyer_id, course_id, amount_minor, currency, status, gateway,
                gateway_order_ref, gateway_payment_ref, payment_method, failure_reason,
                created_at, updated_at, completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(purchase.id.as_uuid())
        .bind(purchase.buyer_id.as_str())
        .bind(purchase.course_id.as_uuid())
        .bind(purchase.amount.minor_units)
        .bind(purchase.amount.currency.as_str())
        .bind(purchase.status.as_str())
        .bind(purchase.gateway.as_str())
        .bind(&purchase.gateway_order_ref)
        .bind(&purchase.gateway_payment_ref)
        .bind(&purchase.payment_method)
        .bind(&purchase.failure_reason)
        .bind(purchase.created_at.as_datetime())
        .bind(purchase.updated_at.as_datetime())
        .bind(purchase.completed_at.as_ref().map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| write_error("insert", e))?;

        Ok(())
    }

    async fn update_if_status(
        &self,
        purchase: &Purchase,
        expected: PurchaseStatus,
    ) -> Result<bool, DomainError> {
        let refund = purchase.refund.as_ref();
        let result = sqlx::query(
            r#"
            UPDATE purchases SET
                status = $3,
                amount_minor = $4,
                gateway_order_ref = $5,
                gateway_payment_ref = $6,
                payment_method = $7,
                failure_reason = $8,
                refund_ref = $9,
                refund_amount_minor = $10,
                refund_reason = $11,
                refunded_at = $12,
                updated_at = $13,
                completed_at = $14
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(purchase.id.as_uuid())
        .bind(expected.as_str())
        .bind(purchase.status.as_str())
        .bind(purchase.amount.minor_units)
        .bind(&purchase.gateway_order_ref)
        .bind(&purchase.gateway_payment_ref)
        .bind(&purchase.payment_method)
        .bind(&purchase.failure_reason)
        .bind(refund.map(|r| r.refund_ref.clone()))
        .bind(refund.map(|r| r.amount.minor_units))
        .bind(refund.map(|r| r.reason.clone()))
        .bind(refund.map(|r| *r.refunded_at.as_datetime()))
        .bind(purchase.updated_at.as_datetime())
        .bind(purchase.completed_at.as_ref().map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| write_error("update", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_id(&self, id: &PurchaseId) -> Result<Option<Purchase>, DomainError> {
        let sql = format!("{} WHERE id = $1", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, PurchaseRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to load purchase: {}", e)))?;
        row.map(Purchase::try_from).transpose()
    }

    async fn find_by_order_ref(&self, order_ref: &str) -> Result<Option<Purchase>, DomainError> {
        let sql = format!("{} WHERE gateway_order_ref = $1", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, PurchaseRow>(&sql)
            .bind(order_ref)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to load purchase: {}", e)))?;
        row.map(Purchase::try_from).transpose()
    }

    async fn find_completed(
        &self,
        buyer_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Purchase>, DomainError> {
        let sql = format!(
            "{} WHERE buyer_id = $1 AND course_id = $2 AND status = 'completed'",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, PurchaseRow>(&sql)
            .bind(buyer_id.as_str())
            .bind(course_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to load purchase: {}", e)))?;
        row.map(Purchase::try_from).transpose()
    }

    async fn find_latest(
        &self,
        buyer_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Purchase>, DomainError> {
        let sql = format!(
            "{} WHERE buyer_id = $1 AND course_id = $2 ORDER BY created_at DESC LIMIT 1",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, PurchaseRow>(&sql)
            .bind(buyer_id.as_str())
            .bind(course_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to load purchase: {}", e)))?;
        row.map(Purchase::try_from).transpose()
    }

    async fn list_by_buyer(
        &self,
        buyer_id: &UserId,
        status: Option<PurchaseStatus>,
    ) -> Result<Vec<Purchase>, DomainError> {
        let sql = format!(
            "{} WHERE buyer_id = $1 AND ($2::text IS NULL OR status = $2) ORDER BY created_at DESC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, PurchaseRow>(&sql)
            .bind(buyer_id.as_str())
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to list purchases: {}", e)))?;
        into_purchases(rows)
    }

    async fn list_by_status(
        &self,
        status: PurchaseStatus,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Purchase>, DomainError> {
        let sql = format!(
            "{} WHERE status = $1 ORDER BY created_at, id OFFSET $2 LIMIT $3",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, PurchaseRow>(&sql)
            .bind(status.as_str())
            .bind(i64::from(offset))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to list purchases: {}", e)))?;
        into_purchases(rows)
    }

    async fn find_stale_pending(
        &self,
        created_before: Timestamp,
        limit: u32,
    ) -> Result<Vec<Purchase>, DomainError> {
        let sql = format!(
            "{} WHERE status = 'pending' AND gateway_order_ref IS NULL AND created_at < $1 \
             ORDER BY created_at LIMIT $2",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, PurchaseRow>(&sql)
            .bind(created_before.as_datetime())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to list stale purchases: {}", e)))?;
        into_purchases(rows)
    }
}
