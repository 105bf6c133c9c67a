//! Cart and association operations on observation requests.
//!
//! Everything a creator does to their draft before submission, the
//! role-aware listing, and the allow-listed association patch. Status
//! changes live in [`super::LifecycleEngine`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::domain::{
    LinkPatch, ObservationRequest, Principal, RequestFilter, RequestId, RequestPatch,
    RequestStarLink, RequestStatus, RequestStore, RequestSummary, Star, StarCatalog, StarId,
    StoreError,
};
use crate::error::ServiceError;

/// The caller's draft and the number of star observations in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartInfo {
    /// The caller's draft.
    pub request_id: RequestId,
    /// Sum of link quantities.
    pub count: i64,
}

/// A link joined with its catalog star.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedStar {
    /// The association row.
    pub link: RequestStarLink,
    /// The catalog entry, `None` if the star row has disappeared.
    pub star: Option<Star>,
}

/// A request with its stars.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDetail {
    /// The request itself.
    pub request: ObservationRequest,
    /// Linked stars ordered by order number.
    pub stars: Vec<LinkedStar>,
}

/// Request/association operations for creators and moderators.
#[derive(Debug, Clone)]
pub struct RequestService {
    requests: Arc<dyn RequestStore>,
    catalog: Arc<dyn StarCatalog>,
}

impl RequestService {
    /// Creates a new `RequestService`.
    #[must_use]
    pub fn new(requests: Arc<dyn RequestStore>, catalog: Arc<dyn StarCatalog>) -> Self {
        Self { requests, catalog }
    }

    async fn load(&self, id: RequestId) -> Result<ObservationRequest, ServiceError> {
        match self.requests.find_request(id).await? {
            Some(request) if request.status != RequestStatus::Deleted => Ok(request),
            _ => Err(ServiceError::NotFound(format!("request {id}"))),
        }
    }

    /// Returns the caller's draft, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::StorageFailure`] if the store fails.
    pub async fn cart(&self, caller: Principal) -> Result<CartInfo, ServiceError> {
        let draft = self
            .requests
            .get_or_create_draft(caller.user_id, Utc::now())
            .await?;
        let count = self.requests.cart_count(draft.id).await?;
        Ok(CartInfo {
            request_id: draft.id,
            count,
        })
    }

    /// Adds an active catalog star to the caller's draft, incrementing
    /// its quantity when already present.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] for an unknown or inactive star.
    /// - [`ServiceError::InvalidState`] if the draft was submitted
    ///   concurrently.
    pub async fn add_star(
        &self,
        caller: Principal,
        star_id: StarId,
    ) -> Result<RequestStarLink, ServiceError> {
        if self.catalog.find_star(star_id).await?.is_none() {
            return Err(ServiceError::NotFound(format!("star {star_id}")));
        }

        let draft = self
            .requests
            .get_or_create_draft(caller.user_id, Utc::now())
            .await?;
        let link = self.requests.add_star_to_draft(draft.id, star_id).await?;
        tracing::info!(
            request_id = %draft.id,
            %star_id,
            quantity = link.quantity,
            "star added to draft"
        );
        Ok(link)
    }

    /// Lists requests visible to the caller.
    ///
    /// Non-moderators only ever see their own requests, whatever the
    /// filter says.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::StorageFailure`] if the store fails.
    pub async fn list(
        &self,
        caller: Principal,
        mut filter: RequestFilter,
    ) -> Result<Vec<RequestSummary>, ServiceError> {
        if caller.is_moderator {
            filter.creator_id = None;
        } else {
            filter.creator_id = Some(caller.user_id);
        }
        Ok(self.requests.list_requests(&filter).await?)
    }

    /// Loads a request with its stars.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] for an unknown or deleted request.
    /// - [`ServiceError::Forbidden`] unless the caller is the creator or a
    ///   moderator.
    pub async fn detail(
        &self,
        caller: Principal,
        id: RequestId,
    ) -> Result<RequestDetail, ServiceError> {
        let request = self.load(id).await?;
        if request.creator_id != caller.user_id && !caller.is_moderator {
            return Err(ServiceError::Forbidden(
                "request belongs to another user".to_string(),
            ));
        }

        let links = self.requests.links(id).await?;
        let ids: Vec<StarId> = links.iter().map(|l| l.star_id).collect();
        let mut stars: HashMap<StarId, Star> = self
            .catalog
            .stars_by_ids(&ids)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        let stars = links
            .into_iter()
            .map(|link| LinkedStar {
                star: stars.remove(&link.star_id),
                link,
            })
            .collect();
        Ok(RequestDetail { request, stars })
    }

    /// Patches the observation date and observer coordinates of a draft.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Validation`] for an empty patch or out-of-range
    ///   coordinates.
    /// - [`ServiceError::Forbidden`] unless the caller is the creator.
    /// - [`ServiceError::InvalidState`] unless the request is a draft.
    pub async fn update_fields(
        &self,
        caller: Principal,
        id: RequestId,
        patch: &RequestPatch,
    ) -> Result<ObservationRequest, ServiceError> {
        patch.validate().map_err(ServiceError::Validation)?;
        let request = self.load(id).await?;
        if request.creator_id != caller.user_id {
            return Err(ServiceError::Forbidden(
                "only the creator can edit a request".to_string(),
            ));
        }
        self.requests
            .update_request_fields(id, RequestStatus::Draft, patch)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidState(format!("request {id} is no longer a draft"))
            })
    }

    /// Patches an association.
    ///
    /// `order_number` and `quantity` may be changed by the creator while
    /// the request is a draft. `result_value` may be corrected by a
    /// moderator once the request is completed.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Validation`] for an empty patch or bad values.
    /// - [`ServiceError::Forbidden`] / [`ServiceError::InvalidState`] when
    ///   the caller or status does not allow a requested field.
    /// - [`ServiceError::NotFound`] if the star is not linked.
    pub async fn update_association(
        &self,
        caller: Principal,
        id: RequestId,
        star_id: StarId,
        patch: &LinkPatch,
    ) -> Result<RequestStarLink, ServiceError> {
        patch.validate().map_err(ServiceError::Validation)?;
        let request = self.load(id).await?;

        if patch.touches_cart_fields() {
            if request.creator_id != caller.user_id {
                return Err(ServiceError::Forbidden(
                    "only the creator can reorder or resize the cart".to_string(),
                ));
            }
            if request.status != RequestStatus::Draft {
                return Err(ServiceError::InvalidState(format!(
                    "request {id} is {}, cart fields are frozen",
                    request.status
                )));
            }
        }
        if patch.result_value.is_some() {
            if !caller.is_moderator {
                return Err(ServiceError::Forbidden(
                    "moderator role required to correct results".to_string(),
                ));
            }
            if request.status != RequestStatus::Completed {
                return Err(ServiceError::InvalidState(format!(
                    "request {id} is {}, results can only be corrected once completed",
                    request.status
                )));
            }
        }

        let link = self
            .requests
            .update_link(id, star_id, patch)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("star {star_id} in request {id}")))?;
        tracing::info!(request_id = %id, %star_id, "association updated");
        Ok(link)
    }

    /// Removes a star from a draft or formed request. Removing a star that
    /// is not linked succeeds.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Forbidden`] unless the caller is the creator or a
    ///   moderator.
    /// - [`ServiceError::InvalidState`] once the request is resolved.
    pub async fn remove_association(
        &self,
        caller: Principal,
        id: RequestId,
        star_id: StarId,
    ) -> Result<(), ServiceError> {
        let request = self.load(id).await?;
        if request.creator_id != caller.user_id && !caller.is_moderator {
            return Err(ServiceError::Forbidden(
                "request belongs to another user".to_string(),
            ));
        }
        if !request.status.allows_link_removal() {
            return Err(ServiceError::InvalidState(format!(
                "request {id} is {}, stars can no longer be removed",
                request.status
            )));
        }

        match self.requests.remove_link(id, star_id).await {
            Ok(()) => {
                tracing::info!(request_id = %id, %star_id, "association removed");
                Ok(())
            }
            Err(StoreError::Conflict(msg)) => Err(ServiceError::InvalidState(msg)),
            Err(e) => Err(e.into()),
        }
    }
}
