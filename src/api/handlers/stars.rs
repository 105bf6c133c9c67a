//! Catalog handlers: list, get, moderator edits, add to draft.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::auth::AuthUser;
use crate::api::dto::StarListParams;
use crate::api::extract::{ApiJson, ApiPath, ApiQuery};
use crate::app_state::AppState;
use crate::domain::{NewStar, RequestStarLink, Star, StarId, StarPatch};
use crate::error::{ErrorResponse, ServiceError};

/// `GET /stars`: List active stars.
///
/// # Errors
///
/// Returns [`ServiceError::StorageFailure`] if the catalog is unavailable.
#[utoipa::path(
    get,
    path = "/api/v1/stars",
    tag = "Stars",
    summary = "List stars",
    description = "Returns active catalog stars, optionally filtered by a name substring.",
    params(StarListParams),
    responses(
        (status = 200, description = "Active stars", body = Vec<Star>),
    )
)]
pub async fn list_stars(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<StarListParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let stars = state.catalog.list(params.name.as_deref()).await?;
    Ok(Json(stars))
}

/// `GET /stars/{id}`: One active star.
///
/// # Errors
///
/// Returns [`ServiceError::NotFound`] for an unknown or inactive star.
#[utoipa::path(
    get,
    path = "/api/v1/stars/{id}",
    tag = "Stars",
    summary = "Get star",
    params(
        ("id" = i64, Path, description = "Star id"),
    ),
    responses(
        (status = 200, description = "Star details", body = Star),
        (status = 404, description = "Star not found", body = ErrorResponse),
    )
)]
pub async fn get_star(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<StarId>,
) -> Result<impl IntoResponse, ServiceError> {
    let star = state.catalog.get(id).await?;
    Ok(Json(star))
}

/// `POST /stars`: Add a catalog star.
///
/// # Errors
///
/// Returns [`ServiceError::Forbidden`] for non-moderators and
/// [`ServiceError::Validation`] for bad input.
#[utoipa::path(
    post,
    path = "/api/v1/stars",
    tag = "Stars",
    summary = "Create star",
    description = "Moderators only. Coordinates are degrees: `ra` in [0, 360), `dec` in [-90, 90].",
    request_body = NewStar,
    responses(
        (status = 201, description = "Star created", body = Star),
        (status = 400, description = "Invalid star", body = ErrorResponse),
        (status = 401, description = "No valid session", body = ErrorResponse),
        (status = 403, description = "Not a moderator", body = ErrorResponse),
    )
)]
pub async fn create_star(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(star): ApiJson<NewStar>,
) -> Result<impl IntoResponse, ServiceError> {
    let star = state.catalog.create(auth.principal, &star).await?;
    Ok((StatusCode::CREATED, Json(star)))
}

/// `PUT /stars/{id}`: Edit a catalog star.
///
/// # Errors
///
/// Returns [`ServiceError::Forbidden`] for non-moderators,
/// [`ServiceError::Validation`] for an empty or invalid patch and
/// [`ServiceError::NotFound`] for an unknown or inactive star.
#[utoipa::path(
    put,
    path = "/api/v1/stars/{id}",
    tag = "Stars",
    summary = "Update star",
    description = "Moderators only. Patches name, descriptions, image location and coordinates; activation is not part of the patch.",
    params(
        ("id" = i64, Path, description = "Star id"),
    ),
    request_body = StarPatch,
    responses(
        (status = 200, description = "Updated star", body = Star),
        (status = 400, description = "Invalid patch", body = ErrorResponse),
        (status = 403, description = "Not a moderator", body = ErrorResponse),
        (status = 404, description = "Star not found", body = ErrorResponse),
    )
)]
pub async fn update_star(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<StarId>,
    ApiJson(patch): ApiJson<StarPatch>,
) -> Result<impl IntoResponse, ServiceError> {
    let star = state.catalog.update(auth.principal, id, &patch).await?;
    Ok(Json(star))
}

/// `DELETE /stars/{id}`: Hide a star from the catalog.
///
/// # Errors
///
/// Returns [`ServiceError::Forbidden`] for non-moderators and
/// [`ServiceError::NotFound`] for an unknown or inactive star.
#[utoipa::path(
    delete,
    path = "/api/v1/stars/{id}",
    tag = "Stars",
    summary = "Deactivate star",
    description = "Moderators only. The star disappears from the catalog but stays attached to existing requests.",
    params(
        ("id" = i64, Path, description = "Star id"),
    ),
    responses(
        (status = 204, description = "Star deactivated"),
        (status = 403, description = "Not a moderator", body = ErrorResponse),
        (status = 404, description = "Star not found", body = ErrorResponse),
    )
)]
pub async fn delete_star(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<StarId>,
) -> Result<impl IntoResponse, ServiceError> {
    state.catalog.deactivate(auth.principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /stars/{id}/draft`: Add a star to the caller's draft.
///
/// # Errors
///
/// Returns [`ServiceError::NotFound`] for an unknown or inactive star.
#[utoipa::path(
    post,
    path = "/api/v1/stars/{id}/draft",
    tag = "Stars",
    summary = "Add star to draft",
    description = "Adds the star to the caller's draft, creating the draft if needed. Adding a star that is already in the draft increments its quantity.",
    params(
        ("id" = i64, Path, description = "Star id"),
    ),
    responses(
        (status = 200, description = "Association after the add", body = RequestStarLink),
        (status = 401, description = "No valid session", body = ErrorResponse),
        (status = 404, description = "Star not found", body = ErrorResponse),
    )
)]
pub async fn add_to_draft(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<StarId>,
) -> Result<impl IntoResponse, ServiceError> {
    let link = state.requests.add_star(auth.principal, id).await?;
    Ok(Json(link))
}

/// Catalog routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/stars", get(list_stars).post(create_star))
        .route(
            "/stars/{id}",
            get(get_star).put(update_star).delete(delete_star),
        )
        .route("/stars/{id}/draft", post(add_to_draft))
}
