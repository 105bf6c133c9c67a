//! Lifecycle engine: the observation request state machine.
//!
//! Every status change goes through [`RequestStore::transition`], a
//! compare-and-set on the current status, so a transition can never be
//! applied twice and concurrent callers racing on the same request see
//! exactly one winner. Losers get [`ServiceError::InvalidState`].

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use super::ComputeDispatcher;
use crate::domain::{
    ObservationRequest, Principal, RequestId, RequestStatus, RequestStore, ResolveAction,
    StarResult, StoreError, Transition, UserId,
};
use crate::error::ServiceError;

/// Result of [`LifecycleEngine::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    /// The request was rejected; no computation occurs.
    Rejected(ObservationRequest),
    /// The job was handed to the computation service. The request stays
    /// `formed` until the callback arrives.
    ComputationPending(ObservationRequest),
}

/// Summary of an applied computation callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct CallbackOutcome {
    /// Request the results belong to.
    pub request_id: RequestId,
    /// Number of results written.
    pub stars_updated: usize,
    /// Number of results received.
    pub total_stars: usize,
    /// Status after the callback.
    pub status: RequestStatus,
}

/// Drives submit / resolve / delete and applies computation results.
#[derive(Debug, Clone)]
pub struct LifecycleEngine {
    requests: Arc<dyn RequestStore>,
    dispatcher: Arc<dyn ComputeDispatcher>,
    system_moderator_id: UserId,
}

impl LifecycleEngine {
    /// Creates a new `LifecycleEngine`.
    #[must_use]
    pub fn new(
        requests: Arc<dyn RequestStore>,
        dispatcher: Arc<dyn ComputeDispatcher>,
        system_moderator_id: UserId,
    ) -> Self {
        Self {
            requests,
            dispatcher,
            system_moderator_id,
        }
    }

    /// Loads a live (non-deleted) request.
    async fn load(&self, id: RequestId) -> Result<ObservationRequest, ServiceError> {
        match self.requests.find_request(id).await? {
            Some(request) if request.status != RequestStatus::Deleted => Ok(request),
            _ => Err(ServiceError::NotFound(format!("request {id}"))),
        }
    }

    /// Applies `transition` or reports the lost race.
    async fn apply(
        &self,
        id: RequestId,
        transition: &Transition,
    ) -> Result<ObservationRequest, ServiceError> {
        let updated = self.requests.transition(id, transition).await?.ok_or_else(|| {
            ServiceError::InvalidState(format!(
                "request {id} is no longer {}",
                transition.from
            ))
        })?;
        tracing::info!(
            request_id = %id,
            from = %transition.from,
            to = %transition.to,
            "request status changed"
        );
        Ok(updated)
    }

    /// Submits a draft for moderation.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::InvalidState`] if the request is not a draft.
    /// - [`ServiceError::Forbidden`] if the caller is not the creator.
    /// - [`ServiceError::NotFound`] for an unknown or deleted request.
    pub async fn submit(
        &self,
        caller: Principal,
        id: RequestId,
    ) -> Result<ObservationRequest, ServiceError> {
        let request = self.load(id).await?;
        if request.status != RequestStatus::Draft {
            return Err(ServiceError::InvalidState(format!(
                "request {id} is {}, only drafts can be submitted",
                request.status
            )));
        }
        if request.creator_id != caller.user_id {
            return Err(ServiceError::Forbidden(
                "only the creator can submit a request".to_string(),
            ));
        }

        let transition = Transition {
            formed_at: Some(Utc::now()),
            ..Transition::new(RequestStatus::Draft, RequestStatus::Formed)
        };
        self.apply(id, &transition).await
    }

    /// Rejects a formed request or triggers its computation.
    ///
    /// `auth_token` is the caller's own session token; it is forwarded to
    /// the computation service with the job.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::InvalidState`] if the request is not formed.
    /// - [`ServiceError::Forbidden`] if the caller is not a moderator or
    ///   created the request.
    /// - [`ServiceError::UpstreamFailure`] if the dispatch failed; the
    ///   request is left untouched and the caller may retry.
    pub async fn resolve(
        &self,
        caller: Principal,
        id: RequestId,
        action: ResolveAction,
        auth_token: &str,
    ) -> Result<ResolveOutcome, ServiceError> {
        let request = self.load(id).await?;
        if request.status != RequestStatus::Formed {
            return Err(ServiceError::InvalidState(format!(
                "request {id} is {}, only formed requests can be resolved",
                request.status
            )));
        }
        if !caller.is_moderator {
            return Err(ServiceError::Forbidden(
                "moderator role required".to_string(),
            ));
        }
        if request.creator_id == caller.user_id {
            return Err(ServiceError::Forbidden(
                "a creator cannot moderate their own request".to_string(),
            ));
        }

        match action {
            ResolveAction::Reject => {
                let transition = Transition {
                    completed_at: Some(Utc::now()),
                    moderator_id: Some(caller.user_id),
                    ..Transition::new(RequestStatus::Formed, RequestStatus::Rejected)
                };
                self.apply(id, &transition).await.map(ResolveOutcome::Rejected)
            }
            ResolveAction::Complete => {
                if !self.dispatcher.dispatch(id, auth_token).await {
                    return Err(ServiceError::UpstreamFailure(
                        "computation service unavailable, retry later".to_string(),
                    ));
                }
                tracing::info!(request_id = %id, moderator_id = %caller.user_id, "computation pending");
                Ok(ResolveOutcome::ComputationPending(request))
            }
        }
    }

    /// Logically deletes a draft.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Forbidden`] unless the caller is the creator or a
    ///   moderator.
    /// - [`ServiceError::InvalidState`] if the request is not a draft;
    ///   formed requests must be resolved instead.
    pub async fn delete(
        &self,
        caller: Principal,
        id: RequestId,
    ) -> Result<ObservationRequest, ServiceError> {
        let request = self.load(id).await?;
        if request.creator_id != caller.user_id && !caller.is_moderator {
            return Err(ServiceError::Forbidden(
                "only the creator or a moderator can delete a request".to_string(),
            ));
        }
        match request.status {
            RequestStatus::Draft => {}
            RequestStatus::Formed => {
                return Err(ServiceError::InvalidState(format!(
                    "request {id} is formed and must be resolved, not deleted"
                )));
            }
            other => {
                return Err(ServiceError::InvalidState(format!(
                    "request {id} is {other} and cannot be deleted"
                )));
            }
        }

        let transition = Transition {
            completed_at: Some(Utc::now()),
            ..Transition::new(RequestStatus::Draft, RequestStatus::Deleted)
        };
        self.apply(id, &transition).await
    }

    /// Writes per-star results delivered by the computation callback and
    /// completes the request if at least one of them landed, in one atomic
    /// store operation.
    ///
    /// Results for stars not linked to the request are logged and skipped.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::InvalidState`] if the request is not formed
    ///   (stale, replayed or concurrent callback). Nothing is written.
    /// - [`ServiceError::NotFound`] for an unknown request.
    /// - [`ServiceError::Internal`] if the system moderator account is
    ///   missing. Nothing is written.
    pub async fn apply_computation_result(
        &self,
        id: RequestId,
        results: &[StarResult],
    ) -> Result<CallbackOutcome, ServiceError> {
        self.load(id).await?;
        let completion = Transition {
            completed_at: Some(Utc::now()),
            moderator_id: Some(self.system_moderator_id),
            ..Transition::new(RequestStatus::Formed, RequestStatus::Completed)
        };

        let applied = self
            .requests
            .complete_with_results(id, results, &completion)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(what) => ServiceError::Internal(format!(
                    "system moderator {} unavailable: {what}",
                    self.system_moderator_id
                )),
                other => other.into(),
            })?
            .ok_or_else(|| {
                ServiceError::InvalidState(format!(
                    "request {id} is no longer formed, no computation pending"
                ))
            })?;

        for star_id in &applied.skipped {
            tracing::warn!(request_id = %id, %star_id, "result skipped: star not linked");
        }
        if applied.written.is_empty() {
            tracing::warn!(request_id = %id, total = results.len(), "callback wrote no results");
        } else {
            tracing::info!(
                request_id = %id,
                stars_updated = applied.written.len(),
                "computation results applied"
            );
        }

        Ok(CallbackOutcome {
            request_id: id,
            stars_updated: applied.written.len(),
            total_stars: results.len(),
            status: applied.request.status,
        })
    }
}
