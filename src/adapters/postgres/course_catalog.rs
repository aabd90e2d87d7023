//! PostgreSQL course catalog reader.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{CourseId, Currency, DomainError, ErrorCode, Money};
use crate::ports::{CourseCatalog, CourseListing};

pub struct PostgresCourseCatalog {
    pool: PgPool,
    default_currency: Currency,
}

impl PostgresCourseCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            default_currency: Currency::inr(),
        }
    }

    /// Currency assumed for rows that leave the column blank.
    pub fn with_default_currency(mut self, currency: Currency) -> Self {
        self.default_currency = currency;
        self
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CourseRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    price: i64,
    currency: String,
}

impl CourseRow {
    fn into_listing(self, default_currency: &Currency) -> Result<CourseListing, DomainError> {
        let currency = match self.currency.trim() {
            "" => default_currency.clone(),
            code => Currency::new(code)
                .map_err(|e| DomainError::new(ErrorCode::DatabaseError, e.to_string()))?,
        };
        // Catalog prices are whole major units.
        let price = Money::from_major(self.price, currency)
            .map_err(|e| DomainError::new(ErrorCode::DatabaseError, e.to_string()))?;
        Ok(CourseListing {
            id: CourseId::from_uuid(self.id),
            title: self.title,
            description: self.description,
            price,
        })
    }
}

#[async_trait]
impl CourseCatalog for PostgresCourseCatalog {
    async fn get_course(&self, id: &CourseId) -> Result<Option<CourseListing>, DomainError> {
        let row = sqlx::query_as::<_, CourseRow>(
            "SELECT id, title, description, price, currency FROM courses WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to load course: {}", e)))?;

        row.map(|r| r.into_listing(&self.default_currency))
            .transpose()
    }
}
