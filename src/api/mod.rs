//! REST API layer: route handlers, DTOs, session extraction, and router
//! composition.
//!
//! All resource endpoints are mounted under `/api/v1`; `/health` sits at
//! the root. With the `swagger-ui` feature the OpenAPI document is served
//! at `/api-docs/openapi.json` and browsable at `/swagger-ui`.

pub mod auth;
pub mod dto;
pub mod extract;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI description of every endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "skywatch-gateway",
        description = "Telescope observation requests with asynchronous pointing-accuracy computation."
    ),
    paths(
        handlers::system::health_handler,
        handlers::users::register,
        handlers::users::login,
        handlers::users::logout,
        handlers::users::me,
        handlers::users::update_me,
        handlers::stars::list_stars,
        handlers::stars::get_star,
        handlers::stars::create_star,
        handlers::stars::update_star,
        handlers::stars::delete_star,
        handlers::stars::add_to_draft,
        handlers::requests::cart,
        handlers::requests::list_requests,
        handlers::requests::get_request,
        handlers::requests::update_request,
        handlers::requests::submit_request,
        handlers::requests::resolve_request,
        handlers::requests::delete_request,
        handlers::requests::receive_results,
        handlers::requests::update_association,
        handlers::requests::remove_association,
    ),
    tags(
        (name = "System", description = "Health"),
        (name = "Users", description = "Accounts and sessions"),
        (name = "Stars", description = "Star catalog"),
        (name = "Requests", description = "Observation request lifecycle"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}
