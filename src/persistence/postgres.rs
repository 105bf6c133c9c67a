//! PostgreSQL implementation of the storage ports.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::models::{LinkRow, RequestRow, RequestSummaryRow, StarRow, UserRow};
use crate::config::ServiceConfig;
use crate::domain::{
    AppliedResults, LinkPatch, NewStar, ObservationRequest, RequestFilter, RequestId,
    RequestPatch, RequestStarLink, RequestStatus, RequestStore, RequestSummary, Star,
    StarCatalog, StarId, StarPatch, StarResult, StoreError, Transition, User, UserId, UserPatch,
    UserStore,
};

const REQUEST_COLUMNS: &str = "id, creator_id, moderator_id, status, created_at, formed_at, \
     completed_at, observation_date, observer_latitude, observer_longitude";

const LINK_COLUMNS: &str = "request_id, star_id, order_number, quantity, result_value";

const STAR_COLUMNS: &str = "id, name, short_description, image_url, is_active, ra, dec";

/// Compare-and-set status update shared by plain transitions and callback
/// completion.
fn transition_sql() -> String {
    format!(
        "UPDATE observation_requests SET status = $3, \
         formed_at = COALESCE($4, formed_at), \
         completed_at = COALESCE($5, completed_at), \
         moderator_id = COALESCE($6, moderator_id) \
         WHERE id = $1 AND status = $2 RETURNING {REQUEST_COLUMNS}"
    )
}

/// Attempts made by [`PostgresStore::get_or_create_draft`] before giving up
/// on a draft that keeps disappearing between insert and select.
const DRAFT_ATTEMPTS: usize = 3;

/// Maps a driver error onto the port error, recognising constraint codes.
fn map_db_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some("23505") => {
                return StoreError::Duplicate(db.constraint().unwrap_or("row").to_string());
            }
            Some("23503") => {
                return StoreError::NotFound(db.constraint().unwrap_or("referenced row").to_string());
            }
            _ => {}
        }
    }
    StoreError::Backend(err.to_string())
}

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool sized from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the database is unreachable.
    pub async fn connect(config: &ServiceConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(map_db_error)?;
        Ok(Self::new(pool))
    }

    /// Applies the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[async_trait]
impl RequestStore for PostgresStore {
    async fn get_or_create_draft(
        &self,
        creator_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<ObservationRequest, StoreError> {
        // The partial unique index on (creator_id) WHERE status = 'draft'
        // makes the insert a no-op when a draft already exists.
        let insert = format!(
            "INSERT INTO observation_requests (creator_id, status, created_at, observation_date) \
             VALUES ($1, 'draft', $2, $2) \
             ON CONFLICT (creator_id) WHERE status = 'draft' DO NOTHING \
             RETURNING {REQUEST_COLUMNS}"
        );
        let select = format!(
            "SELECT {REQUEST_COLUMNS} FROM observation_requests \
             WHERE creator_id = $1 AND status = 'draft'"
        );

        for _ in 0..DRAFT_ATTEMPTS {
            let created = sqlx::query_as::<_, RequestRow>(&insert)
                .bind(creator_id.get())
                .bind(now)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_error)?;
            if let Some(row) = created {
                tracing::info!(%creator_id, request_id = row.id, "draft created");
                return row.try_into();
            }

            let existing = sqlx::query_as::<_, RequestRow>(&select)
                .bind(creator_id.get())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_error)?;
            if let Some(row) = existing {
                return row.try_into();
            }
            // The conflicting draft was submitted or deleted in between.
        }

        Err(StoreError::Backend(format!(
            "could not obtain a draft for user {creator_id}"
        )))
    }

    async fn find_request(
        &self,
        id: RequestId,
    ) -> Result<Option<ObservationRequest>, StoreError> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM observation_requests WHERE id = $1");
        sqlx::query_as::<_, RequestRow>(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?
            .map(TryInto::try_into)
            .transpose()
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<RequestSummary>, StoreError> {
        let mut qb = sqlx::QueryBuilder::<sqlx::Postgres>::new(
            "SELECT r.id, r.creator_id, r.moderator_id, r.status, r.created_at, r.formed_at, \
             r.completed_at, r.observation_date, r.observer_latitude, r.observer_longitude, \
             COUNT(l.star_id) AS total_stars, COUNT(l.result_value) AS completed_stars \
             FROM observation_requests r \
             LEFT JOIN request_stars l ON l.request_id = r.id WHERE ",
        );
        match filter.status {
            Some(status) => {
                qb.push("r.status = ").push_bind(status.as_str());
            }
            None => {
                qb.push("r.status <> 'deleted'");
            }
        }
        if let Some(creator_id) = filter.creator_id {
            qb.push(" AND r.creator_id = ").push_bind(creator_id.get());
        }
        if let Some(from) = filter.formed_from {
            qb.push(" AND r.formed_at >= ").push_bind(from);
        }
        if let Some(to) = filter.formed_to {
            qb.push(" AND r.formed_at <= ").push_bind(to);
        }
        qb.push(" GROUP BY r.id ORDER BY r.created_at DESC");

        qb.build_query_as::<RequestSummaryRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?
            .into_iter()
            .map(TryInto::try_into)
            .collect()
    }

    async fn update_request_fields(
        &self,
        id: RequestId,
        expected: RequestStatus,
        patch: &RequestPatch,
    ) -> Result<Option<ObservationRequest>, StoreError> {
        let sql = format!(
            "UPDATE observation_requests SET \
             observation_date = COALESCE($3, observation_date), \
             observer_latitude = COALESCE($4, observer_latitude), \
             observer_longitude = COALESCE($5, observer_longitude) \
             WHERE id = $1 AND status = $2 RETURNING {REQUEST_COLUMNS}"
        );
        sqlx::query_as::<_, RequestRow>(&sql)
            .bind(id.get())
            .bind(expected.as_str())
            .bind(patch.observation_date)
            .bind(patch.observer_latitude)
            .bind(patch.observer_longitude)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?
            .map(TryInto::try_into)
            .transpose()
    }

    async fn transition(
        &self,
        id: RequestId,
        transition: &Transition,
    ) -> Result<Option<ObservationRequest>, StoreError> {
        sqlx::query_as::<_, RequestRow>(&transition_sql())
            .bind(id.get())
            .bind(transition.from.as_str())
            .bind(transition.to.as_str())
            .bind(transition.formed_at)
            .bind(transition.completed_at)
            .bind(transition.moderator_id.map(UserId::get))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?
            .map(TryInto::try_into)
            .transpose()
    }

    async fn add_star_to_draft(
        &self,
        request_id: RequestId,
        star_id: StarId,
    ) -> Result<RequestStarLink, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        // Row lock on the request serialises adds against submit/delete.
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM observation_requests WHERE id = $1 FOR UPDATE")
                .bind(request_id.get())
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_db_error)?;
        match status.as_deref() {
            None => return Err(StoreError::NotFound(format!("request {request_id}"))),
            Some("draft") => {}
            Some(other) => {
                return Err(StoreError::Conflict(format!(
                    "request {request_id} is {other}, stars can only be added to a draft"
                )));
            }
        }

        let sql = format!(
            "INSERT INTO request_stars (request_id, star_id, order_number, quantity) \
             VALUES ($1, $2, \
               (SELECT COALESCE(MAX(order_number), 0) + 1 FROM request_stars WHERE request_id = $1), \
               1) \
             ON CONFLICT (request_id, star_id) \
             DO UPDATE SET quantity = request_stars.quantity + 1 \
             RETURNING {LINK_COLUMNS}"
        );
        let row = sqlx::query_as::<_, LinkRow>(&sql)
            .bind(request_id.get())
            .bind(star_id.get())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(row.into())
    }

    async fn links(&self, request_id: RequestId) -> Result<Vec<RequestStarLink>, StoreError> {
        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM request_stars WHERE request_id = $1 \
             ORDER BY order_number, star_id"
        );
        Ok(sqlx::query_as::<_, LinkRow>(&sql)
            .bind(request_id.get())
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn update_link(
        &self,
        request_id: RequestId,
        star_id: StarId,
        patch: &LinkPatch,
    ) -> Result<Option<RequestStarLink>, StoreError> {
        let sql = format!(
            "UPDATE request_stars SET \
             order_number = COALESCE($3, order_number), \
             quantity = COALESCE($4, quantity), \
             result_value = COALESCE($5, result_value) \
             WHERE request_id = $1 AND star_id = $2 RETURNING {LINK_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, LinkRow>(&sql)
            .bind(request_id.get())
            .bind(star_id.get())
            .bind(patch.order_number)
            .bind(patch.quantity)
            .bind(patch.result_value)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?
            .map(Into::into))
    }

    async fn remove_link(&self, request_id: RequestId, star_id: StarId) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM observation_requests WHERE id = $1 FOR UPDATE")
                .bind(request_id.get())
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_db_error)?;
        match status.as_deref() {
            None => return Err(StoreError::NotFound(format!("request {request_id}"))),
            Some("draft" | "formed") => {}
            Some(other) => {
                return Err(StoreError::Conflict(format!(
                    "request {request_id} is {other}, stars can no longer be removed"
                )));
            }
        }
        sqlx::query("DELETE FROM request_stars WHERE request_id = $1 AND star_id = $2")
            .bind(request_id.get())
            .bind(star_id.get())
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        tx.commit().await.map_err(map_db_error)
    }

    async fn complete_with_results(
        &self,
        id: RequestId,
        results: &[StarResult],
        completion: &Transition,
    ) -> Result<Option<AppliedResults>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        // Concurrent callbacks queue on this lock; the loser sees the new status.
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM observation_requests WHERE id = $1 FOR UPDATE")
                .bind(id.get())
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_db_error)?;
        if status.as_deref() != Some(completion.from.as_str()) {
            return Ok(None);
        }

        let mut written = Vec::new();
        let mut skipped = Vec::new();
        for result in results {
            let updated = sqlx::query(
                "UPDATE request_stars SET result_value = $3 \
                 WHERE request_id = $1 AND star_id = $2",
            )
            .bind(id.get())
            .bind(result.star_id.get())
            .bind(result.result_value)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
            if updated.rows_affected() > 0 {
                written.push(result.star_id);
            } else {
                skipped.push(result.star_id);
            }
        }

        let row = if written.is_empty() {
            let sql = format!("SELECT {REQUEST_COLUMNS} FROM observation_requests WHERE id = $1");
            sqlx::query_as::<_, RequestRow>(&sql)
                .bind(id.get())
                .fetch_one(&mut *tx)
                .await
                .map_err(map_db_error)?
        } else {
            sqlx::query_as::<_, RequestRow>(&transition_sql())
                .bind(id.get())
                .bind(completion.from.as_str())
                .bind(completion.to.as_str())
                .bind(completion.formed_at)
                .bind(completion.completed_at)
                .bind(completion.moderator_id.map(UserId::get))
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_db_error)?
                .ok_or_else(|| StoreError::Conflict(format!("request {id} changed status")))?
        };
        let request: ObservationRequest = row.try_into()?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(Some(AppliedResults {
            request,
            written,
            skipped,
        }))
    }

    async fn cart_count(&self, request_id: RequestId) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM request_stars WHERE request_id = $1",
        )
        .bind(request_id.get())
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        is_moderator: bool,
    ) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (username, password_hash, is_moderator) VALUES ($1, $2, $3) \
             RETURNING id, username, password_hash, is_moderator",
        )
        .bind(username)
        .bind(password_hash)
        .bind(is_moderator)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match map_db_error(e) {
            StoreError::Duplicate(_) => StoreError::Duplicate(format!("username {username}")),
            other => other,
        })?;
        Ok(row.into())
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash, is_moderator FROM users WHERE id = $1",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?
        .map(Into::into))
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash, is_moderator FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?
        .map(Into::into))
    }

    async fn update_user(
        &self,
        id: UserId,
        patch: &UserPatch,
    ) -> Result<Option<User>, StoreError> {
        Ok(sqlx::query_as::<_, UserRow>(
            "UPDATE users SET username = COALESCE($2, username), \
             password_hash = COALESCE($3, password_hash) \
             WHERE id = $1 RETURNING id, username, password_hash, is_moderator",
        )
        .bind(id.get())
        .bind(patch.username.as_deref())
        .bind(patch.password_hash.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?
        .map(Into::into))
    }
}

#[async_trait]
impl StarCatalog for PostgresStore {
    async fn find_star(&self, id: StarId) -> Result<Option<Star>, StoreError> {
        let sql = format!("SELECT {STAR_COLUMNS} FROM stars WHERE id = $1 AND is_active");
        Ok(sqlx::query_as::<_, StarRow>(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?
            .map(Into::into))
    }

    async fn list_stars(&self, name_filter: Option<&str>) -> Result<Vec<Star>, StoreError> {
        let sql = format!(
            "SELECT {STAR_COLUMNS} FROM stars WHERE is_active \
             AND ($1::TEXT IS NULL OR name ILIKE '%' || $1 || '%') ORDER BY id"
        );
        Ok(sqlx::query_as::<_, StarRow>(&sql)
            .bind(name_filter)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn stars_by_ids(&self, ids: &[StarId]) -> Result<Vec<Star>, StoreError> {
        let raw: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        let sql = format!("SELECT {STAR_COLUMNS} FROM stars WHERE id = ANY($1)");
        Ok(sqlx::query_as::<_, StarRow>(&sql)
            .bind(raw)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn create_star(&self, star: &NewStar) -> Result<Star, StoreError> {
        let sql = format!(
            "INSERT INTO stars (name, short_description, image_url, ra, dec) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {STAR_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, StarRow>(&sql)
            .bind(&star.name)
            .bind(&star.short_description)
            .bind(&star.image_url)
            .bind(star.ra)
            .bind(star.dec)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?
            .into())
    }

    async fn update_star(
        &self,
        id: StarId,
        patch: &StarPatch,
    ) -> Result<Option<Star>, StoreError> {
        let sql = format!(
            "UPDATE stars SET name = COALESCE($2, name), \
             short_description = COALESCE($3, short_description), \
             image_url = COALESCE($4, image_url), \
             ra = COALESCE($5, ra), dec = COALESCE($6, dec) \
             WHERE id = $1 AND is_active RETURNING {STAR_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, StarRow>(&sql)
            .bind(id.get())
            .bind(patch.name.as_deref())
            .bind(patch.short_description.as_deref())
            .bind(patch.image_url.as_deref())
            .bind(patch.ra)
            .bind(patch.dec)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?
            .map(Into::into))
    }

    async fn deactivate_star(&self, id: StarId) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE stars SET is_active = FALSE WHERE id = $1 AND is_active")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(result.rows_affected() > 0)
    }
}
