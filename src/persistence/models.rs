//! Database row models and their conversion into domain types.

use chrono::{DateTime, Utc};

use crate::domain::{
    ObservationRequest, RequestId, RequestStarLink, RequestSummary, Star, StarId, StoreError,
    User, UserId,
};

/// A row from the `observation_requests` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RequestRow {
    /// Primary key.
    pub id: i64,
    /// Owning user.
    pub creator_id: i64,
    /// Resolving moderator.
    pub moderator_id: Option<i64>,
    /// Status text (`draft`, `formed`, …).
    pub status: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Formation timestamp.
    pub formed_at: Option<DateTime<Utc>>,
    /// Completion / rejection / deletion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Scheduled observation time.
    pub observation_date: Option<DateTime<Utc>>,
    /// Observer latitude.
    pub observer_latitude: f64,
    /// Observer longitude.
    pub observer_longitude: f64,
}

impl TryFrom<RequestRow> for ObservationRequest {
    type Error = StoreError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|e| StoreError::Backend(format!("request {}: {e}", row.id)))?;
        Ok(Self {
            id: RequestId::new(row.id),
            creator_id: UserId::new(row.creator_id),
            moderator_id: row.moderator_id.map(UserId::new),
            status,
            created_at: row.created_at,
            formed_at: row.formed_at,
            completed_at: row.completed_at,
            observation_date: row.observation_date,
            observer_latitude: row.observer_latitude,
            observer_longitude: row.observer_longitude,
        })
    }
}

/// A request row joined with its link counts.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RequestSummaryRow {
    /// The request columns.
    #[sqlx(flatten)]
    pub request: RequestRow,
    /// `COUNT(*)` of links.
    pub total_stars: i64,
    /// `COUNT(result_value)` of links.
    pub completed_stars: i64,
}

impl TryFrom<RequestSummaryRow> for RequestSummary {
    type Error = StoreError;

    fn try_from(row: RequestSummaryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            request: row.request.try_into()?,
            total_stars: row.total_stars,
            completed_stars: row.completed_stars,
        })
    }
}

/// A row from the `request_stars` association table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LinkRow {
    /// Request half of the composite key.
    pub request_id: i64,
    /// Star half of the composite key.
    pub star_id: i64,
    /// Display position.
    pub order_number: i32,
    /// Repeat count.
    pub quantity: i32,
    /// Computed result.
    pub result_value: Option<f64>,
}

impl From<LinkRow> for RequestStarLink {
    fn from(row: LinkRow) -> Self {
        Self {
            request_id: RequestId::new(row.request_id),
            star_id: StarId::new(row.star_id),
            order_number: row.order_number,
            quantity: row.quantity,
            result_value: row.result_value,
        }
    }
}

/// A row from the `users` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    /// Primary key.
    pub id: i64,
    /// Login name.
    pub username: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    /// Role flag.
    pub is_moderator: bool,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::new(row.id),
            username: row.username,
            password_hash: row.password_hash,
            is_moderator: row.is_moderator,
        }
    }
}

/// A row from the `stars` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StarRow {
    /// Primary key.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// One-line summary.
    pub short_description: String,
    /// Image location.
    pub image_url: String,
    /// Catalog visibility.
    pub is_active: bool,
    /// Right ascension.
    pub ra: f64,
    /// Declination.
    pub dec: f64,
}

impl From<StarRow> for Star {
    fn from(row: StarRow) -> Self {
        Self {
            id: StarId::new(row.id),
            name: row.name,
            short_description: row.short_description,
            image_url: row.image_url,
            is_active: row.is_active,
            ra: row.ra,
            dec: row.dec,
        }
    }
}
