//! Observation request DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{
    ObservationRequest, RequestFilter, RequestId, RequestStatus, RequestSummary, ResolveAction,
    StarId, StarResult,
};
use crate::service::{CartInfo, LinkedStar, RequestDetail};

/// Response body for `GET /requests/cart`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CartResponse {
    /// The caller's draft.
    pub request_id: RequestId,
    /// Total number of star observations in the draft.
    pub count: i64,
}

impl From<CartInfo> for CartResponse {
    fn from(cart: CartInfo) -> Self {
        Self {
            request_id: cart.request_id,
            count: cart.count,
        }
    }
}

/// Query parameters for `GET /requests`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListRequestsParams {
    /// Earliest formation time (inclusive).
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    /// Latest formation time (inclusive).
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    /// Exact status. Deleted requests are hidden unless asked for.
    #[serde(default)]
    pub status: Option<RequestStatus>,
}

impl From<ListRequestsParams> for RequestFilter {
    fn from(params: ListRequestsParams) -> Self {
        Self {
            formed_from: params.from,
            formed_to: params.to,
            status: params.status,
            creator_id: None,
        }
    }
}

/// One entry of `GET /requests`.
#[derive(Debug, Serialize, ToSchema)]
pub struct RequestSummaryDto {
    /// The request.
    #[serde(flatten)]
    pub request: ObservationRequest,
    /// Number of linked stars.
    pub total_stars: i64,
    /// Number of linked stars with a computed result.
    pub completed_stars: i64,
}

impl From<RequestSummary> for RequestSummaryDto {
    fn from(summary: RequestSummary) -> Self {
        Self {
            request: summary.request,
            total_stars: summary.total_stars,
            completed_stars: summary.completed_stars,
        }
    }
}

/// A star inside a request detail.
#[derive(Debug, Serialize, ToSchema)]
pub struct LinkedStarDto {
    /// Star id.
    pub star_id: StarId,
    /// Catalog name.
    pub name: Option<String>,
    /// Right ascension in degrees.
    pub ra: Option<f64>,
    /// Declination in degrees.
    pub dec: Option<f64>,
    /// Public image location.
    pub image_url: Option<String>,
    /// Display position.
    pub order_number: i32,
    /// Repeat count.
    pub quantity: i32,
    /// Computed pointing-accuracy index.
    pub result_value: Option<f64>,
}

impl From<LinkedStar> for LinkedStarDto {
    fn from(linked: LinkedStar) -> Self {
        let LinkedStar { link, star } = linked;
        Self {
            star_id: link.star_id,
            name: star.as_ref().map(|s| s.name.clone()),
            ra: star.as_ref().map(|s| s.ra),
            dec: star.as_ref().map(|s| s.dec),
            image_url: star.map(|s| s.image_url),
            order_number: link.order_number,
            quantity: link.quantity,
            result_value: link.result_value,
        }
    }
}

/// Response body for `GET /requests/{id}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct RequestDetailDto {
    /// The request.
    #[serde(flatten)]
    pub request: ObservationRequest,
    /// Linked stars in display order.
    pub stars: Vec<LinkedStarDto>,
}

impl From<RequestDetail> for RequestDetailDto {
    fn from(detail: RequestDetail) -> Self {
        Self {
            request: detail.request,
            stars: detail.stars.into_iter().map(LinkedStarDto::from).collect(),
        }
    }
}

/// Request body for `PUT /requests/{id}/resolve`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveRequest {
    /// `complete` or `reject`.
    pub action: ResolveAction,
}

/// Response body for `PUT /requests/{id}/resolve`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResolveResponse {
    /// The request after the decision.
    #[serde(flatten)]
    pub request: ObservationRequest,
    /// `pending` while a computation is in flight.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computation: Option<&'static str>,
}

/// Request body for `POST /requests/{id}/results`, sent by the
/// computation service.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CallbackRequest {
    /// Pre-shared secret.
    pub auth_token: String,
    /// Per-star results.
    pub results: Vec<StarResult>,
}
