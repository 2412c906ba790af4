//! Commuter repository for database operations.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;
use sqlx::types::Json;

use commuter_core::{Address, Commuter, CommuterId, LatLng, OrganizationId, UserId};

use super::{CommuterStore, RepositoryError, to_sql_count};

const COMMUTER_COLUMNS: &str = r"
    id, account, email, given_name, surname, internal_id, organization_id, user_id,
    anonymous, link, labels, status, address, coordinate, opts, profile, stats
";

#[derive(sqlx::FromRow)]
struct CommuterRow {
    id: i32,
    account: Option<String>,
    email: Option<String>,
    given_name: Option<String>,
    surname: Option<String>,
    internal_id: Option<String>,
    organization_id: Option<i32>,
    user_id: Option<i32>,
    anonymous: bool,
    link: String,
    labels: Vec<String>,
    status: String,
    address: Option<Json<Address>>,
    coordinate: Option<Json<LatLng>>,
    opts: Json<Map<String, Value>>,
    profile: Json<Map<String, Value>>,
    stats: Json<Map<String, Value>>,
}

impl From<CommuterRow> for Commuter {
    fn from(row: CommuterRow) -> Self {
        Self {
            id: Some(CommuterId::new(row.id)),
            account: row.account,
            email: row.email,
            given_name: row.given_name,
            surname: row.surname,
            internal_id: row.internal_id,
            organization: row.organization_id.map(OrganizationId::new),
            user: row.user_id.map(UserId::new),
            anonymous: row.anonymous,
            link: Some(row.link),
            labels: row.labels,
            status: row.status,
            address: row.address.map(|Json(address)| address),
            coordinate: row.coordinate.map(|Json(coordinate)| coordinate),
            opts: row.opts.0,
            profile: row.profile.0,
            stats: row.stats.0,
        }
    }
}

/// `PostgreSQL` commuter store.
#[derive(Clone)]
pub struct CommuterRepository {
    pool: PgPool,
}

impl CommuterRepository {
    /// Create a new commuter repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, commuter: &Commuter, link: &str) -> Result<Commuter, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO planner.commuter
                (account, email, given_name, surname, internal_id, organization_id, user_id,
                 anonymous, link, labels, status, address, coordinate, opts, profile, stats)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {COMMUTER_COLUMNS}
            "
        );

        let row = sqlx::query_as::<_, CommuterRow>(&sql)
            .bind(&commuter.account)
            .bind(&commuter.email)
            .bind(&commuter.given_name)
            .bind(&commuter.surname)
            .bind(&commuter.internal_id)
            .bind(commuter.organization)
            .bind(commuter.user)
            .bind(commuter.anonymous)
            .bind(link)
            .bind(&commuter.labels)
            .bind(&commuter.status)
            .bind(commuter.address.as_ref().map(Json))
            .bind(commuter.coordinate.map(Json))
            .bind(Json(&commuter.opts))
            .bind(Json(&commuter.profile))
            .bind(Json(&commuter.stats))
            .fetch_one(&self.pool)
            .await
            .map_err(map_link_conflict)?;

        Ok(row.into())
    }
}

#[async_trait]
impl CommuterStore for CommuterRepository {
    async fn find_page(&self, skip: usize, limit: usize) -> Result<Vec<Commuter>, RepositoryError> {
        let sql = format!(
            "SELECT {COMMUTER_COLUMNS} FROM planner.commuter ORDER BY id OFFSET $1 LIMIT $2"
        );

        let rows = sqlx::query_as::<_, CommuterRow>(&sql)
            .bind(to_sql_count(skip))
            .bind(to_sql_count(limit))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Commuter::from).collect())
    }

    async fn find_by_account(&self, account: &str) -> Result<Vec<Commuter>, RepositoryError> {
        let sql =
            format!("SELECT {COMMUTER_COLUMNS} FROM planner.commuter WHERE account = $1 ORDER BY id");

        let rows = sqlx::query_as::<_, CommuterRow>(&sql)
            .bind(account)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Commuter::from).collect())
    }

    async fn find_by_link(&self, link: &str) -> Result<Option<Commuter>, RepositoryError> {
        let sql = format!("SELECT {COMMUTER_COLUMNS} FROM planner.commuter WHERE link = $1");

        let row = sqlx::query_as::<_, CommuterRow>(&sql)
            .bind(link)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Commuter::from))
    }

    async fn get(&self, id: CommuterId) -> Result<Option<Commuter>, RepositoryError> {
        let sql = format!("SELECT {COMMUTER_COLUMNS} FROM planner.commuter WHERE id = $1");

        let row = sqlx::query_as::<_, CommuterRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Commuter::from))
    }

    async fn create(&self, commuter: Commuter) -> Result<Commuter, RepositoryError> {
        self.insert(&commuter, &commuter_core::new_link_token()).await
    }

    async fn save(&self, commuter: &mut Commuter) -> Result<(), RepositoryError> {
        let Some(id) = commuter.id else {
            let link = commuter
                .link
                .clone()
                .unwrap_or_else(commuter_core::new_link_token);
            *commuter = self.insert(commuter, &link).await?;
            return Ok(());
        };

        // The stored link wins over whatever the caller holds.
        let sql = format!(
            r"
            UPDATE planner.commuter SET
                account = $2, email = $3, given_name = $4, surname = $5, internal_id = $6,
                organization_id = $7, user_id = $8, anonymous = $9, labels = $10, status = $11,
                address = $12, coordinate = $13, opts = $14, profile = $15, stats = $16,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {COMMUTER_COLUMNS}
            "
        );

        let row = sqlx::query_as::<_, CommuterRow>(&sql)
            .bind(id)
            .bind(&commuter.account)
            .bind(&commuter.email)
            .bind(&commuter.given_name)
            .bind(&commuter.surname)
            .bind(&commuter.internal_id)
            .bind(commuter.organization)
            .bind(commuter.user)
            .bind(commuter.anonymous)
            .bind(&commuter.labels)
            .bind(&commuter.status)
            .bind(commuter.address.as_ref().map(Json))
            .bind(commuter.coordinate.map(Json))
            .bind(Json(&commuter.opts))
            .bind(Json(&commuter.profile))
            .bind(Json(&commuter.stats))
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        *commuter = row.into();
        Ok(())
    }
}

fn map_link_conflict(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict("commuter link already exists".to_owned());
    }
    RepositoryError::Database(e)
}
