//! Email record repository.
//!
//! Records are append-only; nothing here updates or deletes a row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use commuter_core::{CommuterId, EmailId, OrganizationId};

use super::{EmailStore, RepositoryError};
use crate::models::email::{DeliveryResult, EmailOptions, EmailRecord, NewEmailRecord};

#[derive(sqlx::FromRow)]
struct EmailRow {
    id: i32,
    account: Option<String>,
    commuter_id: i32,
    organization_id: Option<i32>,
    metadata: Json<EmailOptions>,
    result: Json<DeliveryResult>,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl From<EmailRow> for EmailRecord {
    fn from(row: EmailRow) -> Self {
        Self {
            id: EmailId::new(row.id),
            account: row.account,
            commuter: CommuterId::new(row.commuter_id),
            organization: row.organization_id.map(OrganizationId::new),
            metadata: row.metadata.0,
            result: row.result.0,
            created_at: row.created_at,
            modified_at: row.modified_at,
        }
    }
}

/// `PostgreSQL` email record store.
#[derive(Clone)]
pub struct EmailRepository {
    pool: PgPool,
}

impl EmailRepository {
    /// Create a new email repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmailStore for EmailRepository {
    async fn create(&self, record: NewEmailRecord) -> Result<EmailRecord, RepositoryError> {
        let row = sqlx::query_as::<_, EmailRow>(
            r"
            INSERT INTO planner.email (account, commuter_id, organization_id, metadata, result)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, account, commuter_id, organization_id, metadata, result,
                      created_at, modified_at
            ",
        )
        .bind(&record.account)
        .bind(record.commuter)
        .bind(record.organization)
        .bind(Json(&record.metadata))
        .bind(Json(&record.result))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return RepositoryError::NotFound;
            }
            RepositoryError::Database(e)
        })?;

        Ok(row.into())
    }

    async fn latest_for_commuter(
        &self,
        commuter: CommuterId,
    ) -> Result<Option<EmailRecord>, RepositoryError> {
        let row = sqlx::query_as::<_, EmailRow>(
            r"
            SELECT id, account, commuter_id, organization_id, metadata, result,
                   created_at, modified_at
            FROM planner.email
            WHERE commuter_id = $1
            ORDER BY modified_at DESC, id DESC
            LIMIT 1
            ",
        )
        .bind(commuter)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(EmailRecord::from))
    }

    async fn list_for_commuter(
        &self,
        commuter: CommuterId,
    ) -> Result<Vec<EmailRecord>, RepositoryError> {
        let rows = sqlx::query_as::<_, EmailRow>(
            r"
            SELECT id, account, commuter_id, organization_id, metadata, result,
                   created_at, modified_at
            FROM planner.email
            WHERE commuter_id = $1
            ORDER BY modified_at DESC, id DESC
            ",
        )
        .bind(commuter)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(EmailRecord::from).collect())
    }
}
