//! Observation request aggregate and its star associations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{RequestId, RequestStatus, StarId, UserId};

/// The central aggregate: a cart of target stars plus observer coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ObservationRequest {
    /// Request identifier.
    pub id: RequestId,
    /// User who owns the request.
    pub creator_id: UserId,
    /// Moderator that resolved the request, if any.
    pub moderator_id: Option<UserId>,
    /// Current lifecycle status.
    pub status: RequestStatus,
    /// Row creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Set when the draft is submitted.
    pub formed_at: Option<DateTime<Utc>>,
    /// Set on completion, rejection or deletion.
    pub completed_at: Option<DateTime<Utc>>,
    /// Scheduled observation time.
    pub observation_date: Option<DateTime<Utc>>,
    /// Observer latitude in degrees.
    pub observer_latitude: f64,
    /// Observer longitude in degrees.
    pub observer_longitude: f64,
}

/// Many-to-many row joining a request and a star.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RequestStarLink {
    /// Owning request.
    pub request_id: RequestId,
    /// Linked star.
    pub star_id: StarId,
    /// Display position within the request.
    pub order_number: i32,
    /// Number of repeated observations of the star.
    pub quantity: i32,
    /// Pointing-accuracy index, `None` until computed.
    pub result_value: Option<f64>,
}

/// Request row annotated with its association counts.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSummary {
    /// The request itself.
    pub request: ObservationRequest,
    /// Number of linked stars.
    pub total_stars: i64,
    /// Number of linked stars that already carry a result.
    pub completed_stars: i64,
}

/// Filters for [`super::RequestStore::list_requests`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestFilter {
    /// Inclusive lower bound on the formation timestamp.
    pub formed_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the formation timestamp.
    pub formed_to: Option<DateTime<Utc>>,
    /// Exact status; when `None`, deleted requests are excluded.
    pub status: Option<RequestStatus>,
    /// Restrict to requests created by this user.
    pub creator_id: Option<UserId>,
}

impl RequestFilter {
    /// Returns `true` if `request` passes every filter.
    #[must_use]
    pub fn matches(&self, request: &ObservationRequest) -> bool {
        let status_ok = match self.status {
            Some(status) => request.status == status,
            None => request.status != RequestStatus::Deleted,
        };
        let creator_ok = self.creator_id.is_none_or(|id| request.creator_id == id);
        let from_ok = self
            .formed_from
            .is_none_or(|from| request.formed_at.is_some_and(|at| at >= from));
        let to_ok = self
            .formed_to
            .is_none_or(|to| request.formed_at.is_some_and(|at| at <= to));
        status_ok && creator_ok && from_ok && to_ok
    }
}

/// Allow-listed patch for the request's own editable fields.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, ToSchema)]
pub struct RequestPatch {
    /// New scheduled observation time.
    #[serde(default)]
    pub observation_date: Option<DateTime<Utc>>,
    /// New observer latitude in degrees, within `[-90, 90]`.
    #[serde(default)]
    pub observer_latitude: Option<f64>,
    /// New observer longitude in degrees, within `[-180, 180]`.
    #[serde(default)]
    pub observer_longitude: Option<f64>,
}

impl RequestPatch {
    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.observation_date.is_none()
            && self.observer_latitude.is_none()
            && self.observer_longitude.is_none()
    }

    /// Checks coordinate ranges.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first out-of-range field.
    pub fn validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("no fields to update".to_string());
        }
        if let Some(lat) = self.observer_latitude
            && !(-90.0..=90.0).contains(&lat)
        {
            return Err(format!("observer_latitude out of range: {lat}"));
        }
        if let Some(lon) = self.observer_longitude
            && !(-180.0..=180.0).contains(&lon)
        {
            return Err(format!("observer_longitude out of range: {lon}"));
        }
        Ok(())
    }
}

/// Allow-listed patch for a request/star association.
///
/// Any other key in the incoming JSON is dropped during deserialization and
/// never reaches the store.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, ToSchema)]
pub struct LinkPatch {
    /// New display position, at least 1.
    #[serde(default)]
    pub order_number: Option<i32>,
    /// New repeat count, at least 1.
    #[serde(default)]
    pub quantity: Option<i32>,
    /// Corrected result value.
    #[serde(default)]
    pub result_value: Option<f64>,
}

impl LinkPatch {
    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.order_number.is_none() && self.quantity.is_none() && self.result_value.is_none()
    }

    /// Returns `true` if the patch touches the cart fields.
    #[must_use]
    pub const fn touches_cart_fields(&self) -> bool {
        self.order_number.is_some() || self.quantity.is_some()
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("no fields to update".to_string());
        }
        if let Some(order) = self.order_number
            && order < 1
        {
            return Err(format!("order_number must be at least 1, got {order}"));
        }
        if let Some(quantity) = self.quantity
            && quantity < 1
        {
            return Err(format!("quantity must be at least 1, got {quantity}"));
        }
        if let Some(value) = self.result_value
            && !value.is_finite()
        {
            return Err("result_value must be finite".to_string());
        }
        Ok(())
    }

    /// Applies the patch to an in-memory link.
    pub fn apply_to(&self, link: &mut RequestStarLink) {
        if let Some(order) = self.order_number {
            link.order_number = order;
        }
        if let Some(quantity) = self.quantity {
            link.quantity = quantity;
        }
        if let Some(value) = self.result_value {
            link.result_value = Some(value);
        }
    }
}

/// One computed value delivered by the computation callback.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, ToSchema)]
pub struct StarResult {
    /// Star the value belongs to.
    pub star_id: StarId,
    /// Pointing-accuracy index.
    pub result_value: f64,
}

/// What [`super::RequestStore::complete_with_results`] did in its single
/// atomic step.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedResults {
    /// The request after the step. Still `formed` when nothing was written.
    pub request: ObservationRequest,
    /// Stars whose result was written, once per written entry.
    pub written: Vec<StarId>,
    /// Stars that are not linked to the request.
    pub skipped: Vec<StarId>,
}

/// Status change written with compare-and-set semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Status the request must currently have.
    pub from: RequestStatus,
    /// Status to move to.
    pub to: RequestStatus,
    /// Stamped into `formed_at` when set.
    pub formed_at: Option<DateTime<Utc>>,
    /// Stamped into `completed_at` when set.
    pub completed_at: Option<DateTime<Utc>>,
    /// Stamped into `moderator_id` when set.
    pub moderator_id: Option<UserId>,
}

impl Transition {
    /// Creates a bare `from → to` transition with no stamps.
    #[must_use]
    pub const fn new(from: RequestStatus, to: RequestStatus) -> Self {
        Self {
            from,
            to,
            formed_at: None,
            completed_at: None,
            moderator_id: None,
        }
    }

    /// Applies the transition to an in-memory request.
    pub fn apply_to(&self, request: &mut ObservationRequest) {
        request.status = self.to;
        if self.formed_at.is_some() {
            request.formed_at = self.formed_at;
        }
        if self.completed_at.is_some() {
            request.completed_at = self.completed_at;
        }
        if self.moderator_id.is_some() {
            request.moderator_id = self.moderator_id;
        }
    }
}
