//! Service alert repository.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;
use sqlx::types::Json;

use commuter_core::ServiceAlert;

use super::{AlertStore, RepositoryError};

#[derive(sqlx::FromRow)]
struct AlertRow {
    from_date: String,
    to_date: String,
    details: Json<Map<String, Value>>,
}

/// `PostgreSQL` service alert store.
#[derive(Clone)]
pub struct AlertRepository {
    pool: PgPool,
}

impl AlertRepository {
    /// Create a new alert repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertStore for AlertRepository {
    async fn list_all(&self) -> Result<Vec<ServiceAlert>, RepositoryError> {
        let rows = sqlx::query_as::<_, AlertRow>(
            r"
            SELECT from_date, to_date, details
            FROM planner.service_alert
            ORDER BY from_date, id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ServiceAlert {
                from_date: row.from_date,
                to_date: row.to_date,
                details: row.details.0,
            })
            .collect())
    }
}
