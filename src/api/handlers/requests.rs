//! Observation request handlers: cart, listing, detail, lifecycle,
//! associations and the computation callback.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::api::auth::AuthUser;
use crate::api::extract::{ApiJson, ApiPath, ApiQuery};
use crate::api::dto::{
    CallbackRequest, CartResponse, ListRequestsParams, RequestDetailDto, RequestSummaryDto,
    ResolveRequest, ResolveResponse,
};
use crate::app_state::AppState;
use crate::domain::{LinkPatch, ObservationRequest, RequestId, RequestPatch, RequestStarLink, StarId};
use crate::error::{ErrorResponse, ServiceError};
use crate::service::{CallbackOutcome, ResolveOutcome};

/// `GET /requests/cart`: The caller's draft and its size.
///
/// # Errors
///
/// Returns [`ServiceError::Unauthenticated`] without a valid session.
#[utoipa::path(
    get,
    path = "/api/v1/requests/cart",
    tag = "Requests",
    summary = "Current draft",
    description = "Returns the caller's draft, creating an empty one if none exists, with the total number of star observations in it.",
    responses(
        (status = 200, description = "Draft id and count", body = CartResponse),
        (status = 401, description = "No valid session", body = ErrorResponse),
    )
)]
pub async fn cart(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.requests.cart(auth.principal).await?;
    Ok(Json(CartResponse::from(cart)))
}

/// `GET /requests`: List visible requests.
///
/// # Errors
///
/// Returns [`ServiceError::Unauthenticated`] without a valid session.
#[utoipa::path(
    get,
    path = "/api/v1/requests",
    tag = "Requests",
    summary = "List requests",
    description = "Lists requests newest first. Moderators see every request, other users only their own. Deleted requests are hidden unless `status=deleted` is given.",
    params(ListRequestsParams),
    responses(
        (status = 200, description = "Matching requests", body = Vec<RequestSummaryDto>),
        (status = 401, description = "No valid session", body = ErrorResponse),
    )
)]
pub async fn list_requests(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(params): ApiQuery<ListRequestsParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let summaries = state.requests.list(auth.principal, params.into()).await?;
    let data: Vec<RequestSummaryDto> = summaries.into_iter().map(RequestSummaryDto::from).collect();
    Ok(Json(data))
}

/// `GET /requests/{id}`: Request with its stars.
///
/// # Errors
///
/// Returns [`ServiceError::NotFound`] for an unknown or deleted request,
/// [`ServiceError::Forbidden`] for someone else's request.
#[utoipa::path(
    get,
    path = "/api/v1/requests/{id}",
    tag = "Requests",
    summary = "Get request",
    params(
        ("id" = i64, Path, description = "Request id"),
    ),
    responses(
        (status = 200, description = "Request with linked stars", body = RequestDetailDto),
        (status = 403, description = "Not the creator or a moderator", body = ErrorResponse),
        (status = 404, description = "Request not found", body = ErrorResponse),
    )
)]
pub async fn get_request(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<RequestId>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state.requests.detail(auth.principal, id).await?;
    Ok(Json(RequestDetailDto::from(detail)))
}

/// `PUT /requests/{id}`: Edit observation date and coordinates.
///
/// # Errors
///
/// Returns [`ServiceError::Validation`] for bad coordinates,
/// [`ServiceError::InvalidState`] once the request left draft.
#[utoipa::path(
    put,
    path = "/api/v1/requests/{id}",
    tag = "Requests",
    summary = "Update draft fields",
    description = "Patches `observation_date`, `observer_latitude` and `observer_longitude` of the caller's draft. Other fields are ignored.",
    params(
        ("id" = i64, Path, description = "Request id"),
    ),
    request_body = RequestPatch,
    responses(
        (status = 200, description = "Updated request", body = ObservationRequest),
        (status = 400, description = "Invalid patch", body = ErrorResponse),
        (status = 403, description = "Not the creator", body = ErrorResponse),
        (status = 409, description = "Request is not a draft", body = ErrorResponse),
    )
)]
pub async fn update_request(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<RequestId>,
    ApiJson(patch): ApiJson<RequestPatch>,
) -> Result<impl IntoResponse, ServiceError> {
    let request = state
        .requests
        .update_fields(auth.principal, id, &patch)
        .await?;
    Ok(Json(request))
}

/// `PUT /requests/{id}/submit`: Submit a draft for moderation.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidState`] if the request is not a draft,
/// [`ServiceError::Forbidden`] if the caller is not its creator.
#[utoipa::path(
    put,
    path = "/api/v1/requests/{id}/submit",
    tag = "Requests",
    summary = "Submit draft",
    params(
        ("id" = i64, Path, description = "Request id"),
    ),
    responses(
        (status = 200, description = "Request is now formed", body = ObservationRequest),
        (status = 403, description = "Not the creator", body = ErrorResponse),
        (status = 409, description = "Request is not a draft", body = ErrorResponse),
    )
)]
pub async fn submit_request(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<RequestId>,
) -> Result<impl IntoResponse, ServiceError> {
    let request = state.lifecycle.submit(auth.principal, id).await?;
    Ok(Json(request))
}

/// `PUT /requests/{id}/resolve`: Moderator decision.
///
/// # Errors
///
/// Returns [`ServiceError::Forbidden`] for non-moderators and creators,
/// [`ServiceError::InvalidState`] unless formed,
/// [`ServiceError::UpstreamFailure`] if the computation service could not
/// be reached.
#[utoipa::path(
    put,
    path = "/api/v1/requests/{id}/resolve",
    tag = "Requests",
    summary = "Resolve request",
    description = "`reject` finishes the request immediately. `complete` hands it to the computation service and returns 202; the request stays `formed` until the results arrive.",
    params(
        ("id" = i64, Path, description = "Request id"),
    ),
    request_body = ResolveRequest,
    responses(
        (status = 200, description = "Request rejected", body = ResolveResponse),
        (status = 202, description = "Computation pending", body = ResolveResponse),
        (status = 403, description = "Not allowed to moderate this request", body = ErrorResponse),
        (status = 409, description = "Request is not formed", body = ErrorResponse),
        (status = 502, description = "Computation service unavailable; retry", body = ErrorResponse),
    )
)]
pub async fn resolve_request(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<RequestId>,
    ApiJson(req): ApiJson<ResolveRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .lifecycle
        .resolve(auth.principal, id, req.action, &auth.token)
        .await?;
    let (status, body) = match outcome {
        ResolveOutcome::Rejected(request) => (
            StatusCode::OK,
            ResolveResponse {
                request,
                computation: None,
            },
        ),
        ResolveOutcome::ComputationPending(request) => (
            StatusCode::ACCEPTED,
            ResolveResponse {
                request,
                computation: Some("pending"),
            },
        ),
    };
    Ok((status, Json(body)))
}

/// `DELETE /requests/{id}`: Logically delete a draft.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidState`] unless the request is a draft.
#[utoipa::path(
    delete,
    path = "/api/v1/requests/{id}",
    tag = "Requests",
    summary = "Delete draft",
    description = "Marks a draft as deleted. Formed requests must be resolved instead.",
    params(
        ("id" = i64, Path, description = "Request id"),
    ),
    responses(
        (status = 200, description = "Request deleted", body = ObservationRequest),
        (status = 403, description = "Not the creator or a moderator", body = ErrorResponse),
        (status = 409, description = "Request is not a draft", body = ErrorResponse),
    )
)]
pub async fn delete_request(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<RequestId>,
) -> Result<impl IntoResponse, ServiceError> {
    let request = state.lifecycle.delete(auth.principal, id).await?;
    Ok(Json(request))
}

/// `POST /requests/{id}/results`: Computation service callback.
///
/// Not session-protected; authenticated by the shared secret in the body.
///
/// # Errors
///
/// Returns [`ServiceError::Unauthenticated`] for a wrong secret and
/// [`ServiceError::InvalidState`] if no computation is pending.
#[utoipa::path(
    post,
    path = "/api/v1/requests/{id}/results",
    tag = "Requests",
    summary = "Receive computation results",
    description = "Called by the computation service. Writes the per-star results and completes the request in one step when at least one result matched a linked star.",
    params(
        ("id" = i64, Path, description = "Request id"),
    ),
    request_body = CallbackRequest,
    responses(
        (status = 200, description = "Results applied", body = CallbackOutcome),
        (status = 400, description = "Malformed body or id", body = ErrorResponse),
        (status = 401, description = "Wrong shared secret", body = ErrorResponse),
        (status = 409, description = "No computation pending", body = ErrorResponse),
    )
)]
pub async fn receive_results(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<RequestId>,
    ApiJson(req): ApiJson<CallbackRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .callbacks
        .receive_callback(id, &req.auth_token, &req.results)
        .await?;
    Ok(Json(outcome))
}

/// `PUT /requests/{id}/stars/{star_id}`: Patch an association.
///
/// # Errors
///
/// Returns [`ServiceError::Validation`], [`ServiceError::Forbidden`] or
/// [`ServiceError::InvalidState`] depending on the fields and caller.
#[utoipa::path(
    put,
    path = "/api/v1/requests/{id}/stars/{star_id}",
    tag = "Requests",
    summary = "Update association",
    description = "Creators may change `order_number` and `quantity` while the request is a draft. Moderators may correct `result_value` on completed requests. Other fields are ignored.",
    params(
        ("id" = i64, Path, description = "Request id"),
        ("star_id" = i64, Path, description = "Star id"),
    ),
    request_body = LinkPatch,
    responses(
        (status = 200, description = "Updated association", body = RequestStarLink),
        (status = 400, description = "Invalid patch", body = ErrorResponse),
        (status = 403, description = "Field not allowed for caller", body = ErrorResponse),
        (status = 404, description = "Star not in request", body = ErrorResponse),
        (status = 409, description = "Field not editable in this status", body = ErrorResponse),
    )
)]
pub async fn update_association(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath((id, star_id)): ApiPath<(RequestId, StarId)>,
    ApiJson(patch): ApiJson<LinkPatch>,
) -> Result<impl IntoResponse, ServiceError> {
    let link = state
        .requests
        .update_association(auth.principal, id, star_id, &patch)
        .await?;
    Ok(Json(link))
}

/// `DELETE /requests/{id}/stars/{star_id}`: Remove a star.
///
/// Removing a star that is not linked succeeds.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidState`] once the request is resolved,
/// including when it is resolved while the removal is in flight.
#[utoipa::path(
    delete,
    path = "/api/v1/requests/{id}/stars/{star_id}",
    tag = "Requests",
    summary = "Remove association",
    params(
        ("id" = i64, Path, description = "Request id"),
        ("star_id" = i64, Path, description = "Star id"),
    ),
    responses(
        (status = 204, description = "Star removed"),
        (status = 403, description = "Not the creator or a moderator", body = ErrorResponse),
        (status = 409, description = "Request already resolved", body = ErrorResponse),
    )
)]
pub async fn remove_association(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath((id, star_id)): ApiPath<(RequestId, StarId)>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .requests
        .remove_association(auth.principal, id, star_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Request routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/requests", get(list_requests))
        .route("/requests/cart", get(cart))
        .route(
            "/requests/{id}",
            get(get_request).put(update_request).delete(delete_request),
        )
        .route("/requests/{id}/submit", put(submit_request))
        .route("/requests/{id}/resolve", put(resolve_request))
        .route("/requests/{id}/results", post(receive_results))
        .route(
            "/requests/{id}/stars/{star_id}",
            put(update_association).delete(remove_association),
        )
}
